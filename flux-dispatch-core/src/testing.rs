//! Test utilities for flux-dispatch applications
//!
//! - [`TrackingZone`]: zone that counts runs per domain and reports whether
//!   the current thread is inside the tracked domain
//! - [`RecordingErrorHandler`]: keeps every error reported by a dispatcher
//! - [`EventRecorder`]: collects action-bus lifecycle events
//! - [`TestHarness`]: dispatcher wired with all three, with helpers to
//!   complete actions on the result bus
//! - [`assert_lifecycle!`]: assert the statuses observed for one action
//!
//! # Example
//!
//! ```ignore
//! use flux_dispatch::testing::TestHarness;
//! use flux_dispatch::assert_lifecycle;
//!
//! let mut harness = TestHarness::<Counter, CounterAction>::new(Counter::default());
//!
//! let action = Arc::new(CounterAction::Increment);
//! let handle = harness.dispatch(action.clone());
//! harness.succeed(&action);
//! handle.await?;
//!
//! let events = harness.events.collect(2).await;
//! assert_lifecycle!(events, &action, [Dispatched, Successful]);
//! ```

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::action::{ActionContext, ActionStatus};
use crate::bus::{ActionBus, ResultBus};
use crate::dispatcher::{Dispatcher, DispatcherBuilder};
use crate::error::{ActionError, DispatchError, ErrorHandler};
use crate::handle::DispatchHandle;
use crate::zone::Zone;
use crate::Action;

/// How long async helpers wait before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

thread_local! {
    static TRACKED: Cell<bool> = const { Cell::new(false) };
}

/// Zone that records which domain each callback ran in
///
/// Clones share their counters.
#[derive(Debug, Clone, Default)]
pub struct TrackingZone {
    counts: Arc<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    tracked: AtomicUsize,
    untracked: AtomicUsize,
}

/// Restores the thread's tracked flag on drop.
struct Restore(bool);

impl Drop for Restore {
    fn drop(&mut self) {
        TRACKED.with(|flag| flag.set(self.0));
    }
}

fn mark(tracked: bool) -> Restore {
    Restore(TRACKED.with(|flag| flag.replace(tracked)))
}

impl TrackingZone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the current thread is inside a tracked callback of any
    /// `TrackingZone`.
    pub fn is_tracked() -> bool {
        TRACKED.with(Cell::get)
    }

    /// Number of callbacks run inside the tracked domain.
    pub fn tracked_runs(&self) -> usize {
        self.counts.tracked.load(Ordering::SeqCst)
    }

    /// Number of callbacks run outside the tracked domain.
    pub fn untracked_runs(&self) -> usize {
        self.counts.untracked.load(Ordering::SeqCst)
    }
}

impl Zone for TrackingZone {
    fn run(&self, f: &mut dyn FnMut()) {
        self.counts.tracked.fetch_add(1, Ordering::SeqCst);
        let _restore = mark(true);
        f();
    }

    fn run_outside(&self, f: &mut dyn FnMut()) {
        self.counts.untracked.fetch_add(1, Ordering::SeqCst);
        let _restore = mark(false);
        f();
    }
}

/// Error handler that keeps every reported error
#[derive(Debug, Clone, Default)]
pub struct RecordingErrorHandler {
    inner: Arc<Recorded>,
}

#[derive(Debug, Default)]
struct Recorded {
    errors: Mutex<Vec<DispatchError>>,
    /// Whether each error was reported from the tracked domain
    tracked: Mutex<Vec<bool>>,
    notify: Notify,
}

impl RecordingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<DispatchError> {
        self.inner.errors.lock().clone()
    }

    /// For each reported error, whether it was handled inside a tracked
    /// [`TrackingZone`] callback.
    pub fn reported_tracked(&self) -> Vec<bool> {
        self.inner.tracked.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` errors have been reported.
    ///
    /// Returns false if that does not happen within [`DEFAULT_TIMEOUT`].
    pub async fn wait_for(&self, count: usize) -> bool {
        let reached = async {
            loop {
                let notified = self.inner.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(DEFAULT_TIMEOUT, reached).await.is_ok()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn handle_error(&self, error: &DispatchError) {
        self.inner.tracked.lock().push(TrackingZone::is_tracked());
        self.inner.errors.lock().push(error.clone());
        self.inner.notify.notify_waiters();
    }
}

/// Collects lifecycle events from an action bus
///
/// Subscribes on creation; only events published afterwards are seen.
#[derive(Debug)]
pub struct EventRecorder<A> {
    events: mpsc::UnboundedReceiver<ActionContext<A>>,
}

impl<A: Action> EventRecorder<A> {
    pub fn new(bus: &ActionBus<A>) -> Self {
        Self {
            events: bus.subscribe(),
        }
    }

    /// Take every event already published.
    pub fn drain(&mut self) -> Vec<ActionContext<A>> {
        let mut events = Vec::new();
        while let Ok(context) = self.events.try_recv() {
            events.push(context);
        }
        events
    }

    /// Wait for the next event, `None` on timeout or a closed bus.
    pub async fn next(&mut self) -> Option<ActionContext<A>> {
        tokio::time::timeout(DEFAULT_TIMEOUT, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait for up to `count` events; stops early on timeout.
    pub async fn collect(&mut self, count: usize) -> Vec<ActionContext<A>> {
        let mut events = Vec::with_capacity(count);
        while events.len() < count {
            match self.next().await {
                Some(context) => events.push(context),
                None => break,
            }
        }
        events
    }
}

/// Statuses recorded for exactly this `Arc`, in order.
pub fn statuses_for<A>(events: &[ActionContext<A>], action: &Arc<A>) -> Vec<ActionStatus> {
    events
        .iter()
        .filter(|context| context.is_for(action))
        .map(ActionContext::status)
        .collect()
}

/// Dispatcher wired with a [`TrackingZone`], a [`RecordingErrorHandler`]
/// and an [`EventRecorder`]
///
/// The harness owns the result bus, so tests complete actions with
/// [`succeed`](Self::succeed) and [`fail`](Self::fail).
pub struct TestHarness<S, A> {
    pub dispatcher: Dispatcher<S, A>,
    pub zone: TrackingZone,
    pub errors: RecordingErrorHandler,
    pub events: EventRecorder<A>,
}

impl<S, A> TestHarness<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    pub fn new(state: S) -> Self {
        Self::with_builder(Dispatcher::builder(state))
    }

    /// Finish `builder` with the harness zone and error handler.
    pub fn with_builder(builder: DispatcherBuilder<S, A>) -> Self {
        let zone = TrackingZone::new();
        let errors = RecordingErrorHandler::new();
        let dispatcher = builder
            .zone(zone.clone())
            .error_handler(errors.clone())
            .build();
        let events = EventRecorder::new(dispatcher.actions());

        Self {
            dispatcher,
            zone,
            errors,
            events,
        }
    }

    pub fn dispatch(&self, action: impl Into<Arc<A>>) -> DispatchHandle<Arc<S>> {
        self.dispatcher.dispatch(action)
    }

    pub fn dispatch_many<I>(&self, actions: I) -> DispatchHandle<Vec<Arc<S>>>
    where
        I: IntoIterator,
        I::Item: Into<Arc<A>>,
    {
        self.dispatcher.dispatch_many(actions)
    }

    pub fn state(&self) -> Arc<S> {
        self.dispatcher.state().get()
    }

    pub fn results(&self) -> &ResultBus<A> {
        self.dispatcher.results()
    }

    /// Complete `action` successfully.
    pub fn succeed(&self, action: &Arc<A>) {
        self.results()
            .publish(ActionContext::successful(Arc::clone(action)));
    }

    /// Complete `action` with an error.
    pub fn fail(&self, action: &Arc<A>, error: impl Into<ActionError>) {
        self.results()
            .publish(ActionContext::errored(Arc::clone(action), error));
    }

    /// Complete every action dispatched from now on with `handler`'s verdict.
    ///
    /// The handler sees each action once, when its Dispatched event arrives.
    pub fn spawn_handler<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(&A) -> Result<(), ActionError> + Send + 'static,
    {
        let mut events = self.dispatcher.actions().subscribe();
        let results = self.results().clone();

        tokio::spawn(async move {
            while let Some(context) = events.recv().await {
                if context.status() != ActionStatus::Dispatched {
                    continue;
                }

                let action = Arc::clone(context.action());
                match handler(action.as_ref()) {
                    Ok(()) => results.publish(ActionContext::successful(action)),
                    Err(error) => results.publish(ActionContext::errored(action, error)),
                }
            }
        })
    }

    /// Take every lifecycle event published so far.
    pub fn drain_events(&mut self) -> Vec<ActionContext<A>> {
        self.events.drain()
    }
}

/// Assert the lifecycle statuses observed for one action.
///
/// # Example
///
/// ```ignore
/// let events = harness.drain_events();
/// assert_lifecycle!(events, &action, [Dispatched, Errored]);
/// ```
#[macro_export]
macro_rules! assert_lifecycle {
    ($events:expr, $action:expr, [$($status:ident),* $(,)?]) => {{
        let statuses = $crate::testing::statuses_for(&$events, $action);
        let expected: ::std::vec::Vec<$crate::ActionStatus> =
            ::std::vec![$($crate::ActionStatus::$status),*];
        assert_eq!(
            statuses, expected,
            "unexpected lifecycle for {:?}",
            $action
        );
    }};
}
