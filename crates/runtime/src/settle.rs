//! Two completion signals over one set of concurrent tasks.
//!
//! [`settle`] splits a task set into a [`FirstSettled`] signal, which resolves
//! as soon as any task finishes, and an [`AllSettled`] aggregate, which waits
//! for every task and never short-circuits. Tasks report failure through
//! their output type, so the aggregate itself cannot fail.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::FutureExt as _;
use futures_util::stream::{FuturesUnordered, StreamExt as _};
use tokio::sync::oneshot;

use crate::BoxFuture;

/// Resolves once the first task of the set has finished.
///
/// Also resolves when the set is empty or when the [`AllSettled`] half is
/// dropped before any task finished, so awaiting it never hangs.
#[derive(Debug)]
pub struct FirstSettled {
    rx: oneshot::Receiver<()>,
}

impl Future for FirstSettled {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.rx.poll_unpin(cx).map(|_| ())
    }
}

/// Error-tolerant aggregate over a task set. Outputs keep submission order.
pub struct AllSettled<'a, T> {
    pending: FuturesUnordered<BoxFuture<'a, (usize, T)>>,
    len: usize,
    first: Option<oneshot::Sender<()>>,
}

pub fn settle<'a, T, I>(tasks: I) -> (FirstSettled, AllSettled<'a, T>)
where
    T: Send + 'a,
    I: IntoIterator<Item = BoxFuture<'a, T>>,
{
    let (tx, rx) = oneshot::channel();
    let pending: FuturesUnordered<BoxFuture<'a, (usize, T)>> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| -> BoxFuture<'a, (usize, T)> {
            Box::pin(async move { (index, task.await) })
        })
        .collect();
    let len = pending.len();

    (
        FirstSettled { rx },
        AllSettled {
            pending,
            len,
            first: Some(tx),
        },
    )
}

impl<'a, T> AllSettled<'a, T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wait for every task.
    pub async fn wait(self) -> Vec<T> {
        self.wait_each(|_, _| {}).await
    }

    /// Wait for every task, calling `on_settled(index, &output)` as each one
    /// finishes, in completion order.
    pub async fn wait_each(mut self, mut on_settled: impl FnMut(usize, &T)) -> Vec<T> {
        let mut slots: Vec<Option<T>> = (0..self.len).map(|_| None).collect();

        while let Some((index, output)) = self.pending.next().await {
            on_settled(index, &output);
            if let Some(first) = self.first.take() {
                let _ = first.send(());
            }
            slots[index] = Some(output);
        }

        // Empty set: release the first-settle waiter as well.
        self.first.take();
        slots.into_iter().flatten().collect()
    }
}

impl<T> std::fmt::Debug for AllSettled<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllSettled")
            .field("len", &self.len)
            .field("remaining", &self.pending.len())
            .finish()
    }
}
