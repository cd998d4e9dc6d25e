use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Info,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Error => "error",
            NotificationKind::Info => "info",
        }
    }
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Surface for user-visible messages.
///
/// Fire-and-forget: implementations must not panic and callers never observe
/// whether the message was shown.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str, kind: NotificationKind);
}

impl<S: NotificationSink + ?Sized> NotificationSink for std::sync::Arc<S> {
    fn notify(&self, message: &str, kind: NotificationKind) {
        (**self).notify(message, kind)
    }
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Error => tracing::error!(target: "notify", "{message}"),
            NotificationKind::Info => tracing::info!(target: "notify", "{message}"),
        }
    }
}

/// In-memory sink that records every notification in arrival order.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.entries.lock())
    }
}

impl NotificationSink for NotificationLog {
    fn notify(&self, message: &str, kind: NotificationKind) {
        self.entries.lock().push(Notification {
            kind,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{NotificationKind, NotificationLog, NotificationSink};

    #[test]
    fn records_notifications_in_order() {
        let log = NotificationLog::new();
        log.notify("first", NotificationKind::Error);
        log.notify("second", NotificationKind::Info);

        let seen = log.notifications();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].message, "first");
        assert_eq!(seen[1].kind, NotificationKind::Info);
    }

    #[test]
    fn drain_clears_notifications() {
        let log = Arc::new(NotificationLog::new());
        let sink: Arc<dyn NotificationSink> = log.clone();
        sink.notify("m", NotificationKind::Error);
        assert_eq!(log.drain().len(), 1);
        assert!(log.is_empty());
    }
}
