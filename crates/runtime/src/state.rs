use tokio::sync::watch;

/// The only handle allowed to replace a piece of shared state.
///
/// Not `Clone`: whoever owns the writer is the single writer. Readers are
/// handed out with [`StateWriter::reader`].
#[derive(Debug)]
pub struct StateWriter<T> {
    tx: watch::Sender<T>,
}

/// Read-only, cloneable view of shared state.
#[derive(Debug)]
pub struct StateReader<T> {
    rx: watch::Receiver<T>,
}

impl<T> Clone for StateReader<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

pub fn state_channel<T>(initial: T) -> (StateWriter<T>, StateReader<T>) {
    let (tx, rx) = watch::channel(initial);
    (StateWriter { tx }, StateReader { rx })
}

impl<T> StateWriter<T> {
    /// Replace the state wholesale, returning the previous value.
    pub fn set(&self, value: T) -> T {
        self.tx.send_replace(value)
    }

    /// Replace the state only if it differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Modify the state in place; readers see one atomic write.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f)
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.tx.borrow().clone()
    }

    pub fn reader(&self) -> StateReader<T> {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T> StateReader<T> {
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.rx.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.rx.borrow())
    }

    /// Wait for the next write. Returns `false` once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until the state satisfies `pred`. Returns `None` if the writer is
    /// dropped first.
    pub async fn wait_until(&mut self, pred: impl FnMut(&T) -> bool) -> Option<T>
    where
        T: Clone,
    {
        self.rx.wait_for(pred).await.ok().map(|value| value.clone())
    }
}
