//! Correlating dispatched actions with their terminal contexts
//!
//! Every dispatch registers a waiter on the shared result bus for the first
//! terminal context whose action is the very `Arc` it dispatched. Matching is
//! by pointer, so re-dispatching the same `Arc` while it is in flight makes both
//! dispatches settle on whichever terminal context arrives first.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::action::{ActionContext, ActionStatus};
use crate::bus::ResultBus;
use crate::error::{ActionError, DispatchError};
use crate::handle::SharedOutcome;
use crate::state::StateCell;
use crate::Action;

/// The first terminal context for one action, shared between its consumers.
///
/// Resolves to `None` if the result bus closes first.
pub type ResultFuture<A> = Shared<BoxFuture<'static, Option<ActionContext<A>>>>;

/// Wait for the terminal context of `action`.
///
/// The waiter is registered before this returns, so a context published any
/// time afterwards is seen even if nothing polls the future until later.
pub fn result_stream<A: Action>(results: &ResultBus<A>, action: &Arc<A>) -> ResultFuture<A> {
    let waiter = results.wait_for(action);
    async move { waiter.await.ok() }.boxed().shared()
}

/// Convert a terminal context into a dispatch outcome.
///
/// `Successful` resolves with the state current at resolution time, not the
/// one produced by the dispatch. `Errored` fails with the carried error.
/// Only the first context is mapped.
pub fn create_dispatch_outcome<S, A>(
    results: ResultFuture<A>,
    state: StateCell<S>,
) -> SharedOutcome<Arc<S>>
where
    S: Send + Sync + 'static,
    A: Action,
{
    async move {
        let Some(context) = results.await else {
            return Ok(None);
        };

        match context.status() {
            ActionStatus::Successful => Ok(Some(state.get())),
            ActionStatus::Errored => Err(DispatchError::action(
                context.action().name(),
                context
                    .error()
                    .cloned()
                    .unwrap_or_else(ActionError::unspecified),
            )),
            // Never handed to waiters.
            ActionStatus::Dispatched => Ok(None),
        }
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug)]
    enum TestAction {
        Load,
    }

    impl Action for TestAction {
        fn name(&self) -> &'static str {
            "Load"
        }
    }

    #[tokio::test]
    async fn test_matches_only_same_instance() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let mine = Arc::new(TestAction::Load);
        let other = Arc::new(TestAction::Load);

        let result = result_stream(&bus, &mine);
        bus.publish(ActionContext::successful(other));
        bus.publish(ActionContext::dispatched(mine.clone()));
        bus.publish(ActionContext::errored(mine.clone(), "nope"));

        let context = result.await.unwrap();
        assert!(context.is_for(&mine));
        assert_eq!(context.status(), ActionStatus::Errored);
    }

    #[tokio::test]
    async fn test_registers_before_first_poll() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let action = Arc::new(TestAction::Load);

        let result = result_stream(&bus, &action);
        bus.publish(ActionContext::successful(action.clone()));
        tokio::task::yield_now().await;

        assert!(result.await.is_some());
    }

    #[tokio::test]
    async fn test_first_terminal_context_wins() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let action = Arc::new(TestAction::Load);

        let result = result_stream(&bus, &action);
        let replay = result.clone();
        bus.publish(ActionContext::successful(action.clone()));
        bus.publish(ActionContext::errored(action.clone(), "late"));

        assert_eq!(result.await.unwrap().status(), ActionStatus::Successful);
        assert_eq!(replay.await.unwrap().status(), ActionStatus::Successful);
    }

    #[tokio::test]
    async fn test_closed_bus_resolves_none() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let result = result_stream(&bus, &Arc::new(TestAction::Load));
        drop(bus);

        assert!(result.await.is_none());
    }

    #[tokio::test]
    async fn test_burst_of_other_results_does_not_hide_own() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let action = Arc::new(TestAction::Load);
        let result = result_stream(&bus, &action);

        for _ in 0..3000 {
            bus.publish(ActionContext::successful(Arc::new(TestAction::Load)));
        }
        bus.publish(ActionContext::successful(action.clone()));

        assert!(result.await.unwrap().is_for(&action));
    }

    #[tokio::test]
    async fn test_successful_reads_state_at_resolution() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let state = StateCell::new(1u32);
        let action = Arc::new(TestAction::Load);

        let outcome = create_dispatch_outcome(result_stream(&bus, &action), state.clone());
        state.set(Arc::new(2));
        bus.publish(ActionContext::successful(action));

        assert_eq!(*outcome.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_errored_without_value_is_unspecified() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let action = Arc::new(TestAction::Load);

        let outcome = create_dispatch_outcome(result_stream(&bus, &action), StateCell::new(0u32));
        bus.publish(ActionContext::new(action, ActionStatus::Errored, None));

        let err = outcome.await.unwrap_err();
        assert_eq!(err.error().to_string(), ActionError::unspecified().to_string());
    }

    #[tokio::test]
    async fn test_pending_without_terminal_context() {
        let bus: ResultBus<TestAction> = ResultBus::default();
        let action = Arc::new(TestAction::Load);

        let outcome = create_dispatch_outcome(result_stream(&bus, &action), StateCell::new(0u32));
        bus.publish(ActionContext::dispatched(action));

        let waited = tokio::time::timeout(Duration::from_millis(50), outcome).await;
        assert!(waited.is_err());
    }
}
