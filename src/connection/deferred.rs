use crate::core::{Result, StoreError};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

/// Future shared by every observer of a [`Deferred`].
pub type Promise<T> = Shared<BoxFuture<'static, Result<T>>>;

/// A future settled from the outside, exactly once.
///
/// Observers clone the [`Promise`] before or after settlement and all see the
/// same outcome. Only the first `resolve`/`reject` takes effect; later calls
/// return `false` and change nothing.
pub struct Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: Mutex<Option<oneshot::Sender<Result<T>>>>,
    promise: Promise<T>,
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel::<Result<T>>();
        let promise = receiver
            .map(|received| {
                received.unwrap_or_else(|_| {
                    Err(StoreError::Connection(
                        "connection handle dropped before the connection settled".to_string(),
                    ))
                })
            })
            .boxed()
            .shared();

        Self {
            sender: Mutex::new(Some(sender)),
            promise,
        }
    }

    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// Returns `true` if this call settled the promise.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value), || {})
    }

    /// Like [`resolve`](Self::resolve), running `commit` first when this call
    /// is the one that settles. Observers woken by the settlement see
    /// whatever `commit` recorded.
    pub fn resolve_with(&self, value: T, commit: impl FnOnce()) -> bool {
        self.settle(Ok(value), commit)
    }

    /// Returns `true` if this call settled the promise.
    pub fn reject(&self, error: StoreError) -> bool {
        self.settle(Err(error), || {})
    }

    pub fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn settle(&self, outcome: Result<T>, commit: impl FnOnce()) -> bool {
        let mut slot = self.sender.lock().unwrap_or_else(PoisonError::into_inner);

        match slot.take() {
            Some(sender) => {
                commit();
                // The receiver lives inside `self.promise`, so the send cannot fail.
                sender.send(outcome).is_ok()
            }
            None => false,
        }
    }
}

impl<T> Default for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
