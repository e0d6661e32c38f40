//! Replayable handle returned by a dispatch

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;

use crate::error::{DispatchError, DispatchOutcome};
use crate::zone::{enter, Domain, Zone};

/// Shared, single-valued outcome future.
pub type SharedOutcome<T> = Shared<BoxFuture<'static, DispatchOutcome<T>>>;

/// Outcome of a dispatch, awaitable any number of times
///
/// The pipeline runs once whether the handle is awaited, cloned and
/// awaited many times, or dropped. Every awaiter sees the same outcome.
///
/// Awaiting hands the outcome over in the awaiting task. Observers that must
/// run inside the tracked domain register with [`on_settled`](Self::on_settled).
///
/// # Example
/// ```ignore
/// let handle = dispatcher.dispatch(Counter::Increment);
/// let again = handle.clone();
///
/// let state = handle.await?.expect("resolved with state");
/// assert!(Arc::ptr_eq(&state, &again.await?.unwrap()));
/// ```
pub struct DispatchHandle<T: Clone> {
    outcome: SharedOutcome<T>,
    // Zone that settled callbacks re-enter; `None` calls them directly.
    delivery: Option<Arc<dyn Zone>>,
}

impl<T> DispatchHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(outcome: SharedOutcome<T>, delivery: Option<Arc<dyn Zone>>) -> Self {
        Self { outcome, delivery }
    }

    /// Call `f` with the outcome once the dispatch settles.
    ///
    /// On the client `f` runs inside the tracked domain of the dispatcher's
    /// zone. On the server it runs directly, the server being tracked already.
    /// Registering does not keep the pipeline from running, and dropping the
    /// returned task handle does not cancel the callback.
    pub fn on_settled<F>(&self, f: F) -> JoinHandle<()>
    where
        F: FnOnce(DispatchOutcome<T>) + Send + 'static,
    {
        let outcome = self.outcome.clone();
        let delivery = self.delivery.clone();
        tokio::spawn(async move {
            let result = outcome.await;
            match delivery {
                Some(zone) => enter(&*zone, Domain::Tracked, move || f(result)),
                None => f(result),
            }
        })
    }

    /// Split callbacks for a value and an error.
    ///
    /// Completing without a value calls neither.
    pub fn subscribe<V, E>(&self, on_value: V, on_error: E) -> JoinHandle<()>
    where
        V: FnOnce(T) + Send + 'static,
        E: FnOnce(DispatchError) + Send + 'static,
    {
        self.on_settled(move |outcome| match outcome {
            Ok(Some(value)) => on_value(value),
            Ok(None) => {}
            Err(error) => on_error(error),
        })
    }

    /// The outcome, if the dispatch has already settled.
    pub fn peek(&self) -> Option<&DispatchOutcome<T>> {
        self.outcome.peek()
    }

    /// Whether the dispatch has settled.
    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }
}

impl<T: Clone> Clone for DispatchHandle<T> {
    fn clone(&self) -> Self {
        Self {
            outcome: self.outcome.clone(),
            delivery: self.delivery.clone(),
        }
    }
}

impl<T> Future for DispatchHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = DispatchOutcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.outcome.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for DispatchHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("settled", &self.is_settled())
            .field("tracked_delivery", &self.delivery.is_some())
            .finish()
    }
}
