use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier of one hydration attempt.
///
/// Ids are issued in strictly increasing order, so a larger id always belongs
/// to a newer attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResolutionId(u64);

impl ResolutionId {
    pub fn new(n: u64) -> Self {
        ResolutionId(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic issuer of [`ResolutionId`]s that also remembers the latest one.
#[derive(Debug, Default)]
pub struct ResolutionCounter {
    latest: AtomicU64,
}

impl ResolutionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id. It becomes the latest id.
    pub fn issue(&self) -> ResolutionId {
        ResolutionId(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The most recently issued id, or `None` before the first `issue`.
    pub fn latest(&self) -> Option<ResolutionId> {
        match self.latest.load(Ordering::SeqCst) {
            0 => None,
            n => Some(ResolutionId(n)),
        }
    }

    pub fn is_latest(&self, id: ResolutionId) -> bool {
        self.latest() == Some(id)
    }
}
