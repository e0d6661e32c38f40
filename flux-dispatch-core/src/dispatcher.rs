//! Dispatcher: routes actions through the plugin chain and correlates results
//!
//! # Lifecycle of one action
//!
//! ```text
//! dispatch(action)
//!     │  zone: tracked or untracked, picked once per call
//!     ▼
//! plugin 1 ─► plugin 2 ─► … ─► terminal step
//!                                 ├─ state changed? ─► StateCell::set
//!                                 ├─ register ResultBus waiter for this Arc
//!                                 ├─ ActionBus ◄─ Dispatched
//!                                 └─ forward terminal context ─► ActionBus
//!
//! ResultBus ◄─ Successful | Errored   (published by whatever completes the action)
//!     │
//!     ▼
//! DispatchHandle: Ok(Some(current state)) | Err(error)
//! ```
//!
//! Dispatching spawns Tokio tasks, so it must happen inside a Tokio runtime.
//! An action that never receives a terminal context leaves its handle
//! pending forever; plugins and handlers are responsible for completing
//! every action they accept.

use std::fmt;
use std::sync::Arc;

use futures_util::future::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::debug;

use crate::action::ActionContext;
use crate::bus::{ActionBus, ResultBus};
use crate::config::DispatchConfig;
use crate::correlation::{create_dispatch_outcome, result_stream};
use crate::error::{ErrorHandler, TracingErrorHandler};
use crate::handle::{DispatchHandle, SharedOutcome};
use crate::plugin::{self, from_fn, Next, Plugin, PluginChain, PluginFuture};
use crate::state::StateCell;
use crate::zone::{enter, Domain, NoopZone, Platform, Zone};
use crate::Action;

/// Routes actions through the plugin chain and hands back their outcomes
///
/// Cloning is cheap; clones share state, buses and plugins.
///
/// # Example
/// ```ignore
/// let dispatcher = Dispatcher::builder(Counter { count: 0 })
///     .plugin_fn("increment", |state, action, next| {
///         next.run(Arc::new(Counter { count: state.count + 1 }), action)
///     })
///     .build();
///
/// let handle = dispatcher.dispatch(CounterAction::Increment);
/// // ... a handler publishes the terminal context on `dispatcher.results()`
/// let state = handle.await?;
/// ```
pub struct Dispatcher<S, A> {
    inner: Arc<Inner<S, A>>,
}

struct Inner<S, A> {
    state: StateCell<S>,
    actions: ActionBus<A>,
    results: ResultBus<A>,
    plugins: Arc<[Arc<dyn Plugin<S, A>>]>,
    zone: Arc<dyn Zone>,
    error_handler: Arc<dyn ErrorHandler>,
    platform: Platform,
    config: DispatchConfig,
}

impl<S, A> Dispatcher<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    /// Create a dispatcher with no plugins, a [`NoopZone`] and default config.
    pub fn new(state: S) -> Self {
        DispatcherBuilder::new(state).build()
    }

    pub fn builder(state: S) -> DispatcherBuilder<S, A> {
        DispatcherBuilder::new(state)
    }

    /// Dispatch a single action.
    ///
    /// Resolves with the state current when the action completes
    /// successfully, or fails with the action's error. Passing an existing
    /// `Arc` keeps its identity; see [`correlation`](crate::correlation) for
    /// what happens when the same `Arc` is in flight twice.
    pub fn dispatch(&self, action: impl Into<Arc<A>>) -> DispatchHandle<Arc<S>> {
        let action = action.into();
        self.run(|| self.inner.dispatch_single(action))
    }

    /// Dispatch several actions independently and join their outcomes.
    ///
    /// Resolves with one state per action, in input order, once all have
    /// succeeded. Fails as soon as any action fails, without waiting for the
    /// rest. An empty collection resolves immediately with an empty `Vec`.
    pub fn dispatch_many<I>(&self, actions: I) -> DispatchHandle<Vec<Arc<S>>>
    where
        I: IntoIterator,
        I::Item: Into<Arc<A>>,
    {
        let actions: Vec<Arc<A>> = actions.into_iter().map(Into::into).collect();
        self.run(|| {
            let outcomes = actions
                .into_iter()
                .map(|action| self.inner.dispatch_single(action))
                .collect();
            join_all(outcomes)
        })
    }

    /// The domain dispatches run in.
    pub fn domain(&self) -> Domain {
        Domain::select(self.inner.platform, self.inner.config.outside_zone)
    }

    pub fn state(&self) -> &StateCell<S> {
        &self.inner.state
    }

    /// Lifecycle events of every dispatched action.
    pub fn actions(&self) -> &ActionBus<A> {
        &self.inner.actions
    }

    /// Where terminal contexts are published to complete dispatches.
    pub fn results(&self) -> &ResultBus<A> {
        &self.inner.results
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    fn run<T>(&self, op: impl FnOnce() -> SharedOutcome<T>) -> DispatchHandle<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let outcome = enter(&*self.inner.zone, self.domain(), op);
        self.inner.report_errors(outcome.clone());

        // Client observers are handed the outcome back inside the zone.
        let delivery = (!self.inner.platform.is_server()).then(|| Arc::clone(&self.inner.zone));
        DispatchHandle::new(outcome, delivery)
    }
}

impl<S, A> Inner<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    fn dispatch_single(self: &Arc<Self>, action: Arc<A>) -> SharedOutcome<Arc<S>> {
        debug!(action = %action.name(), "Dispatching action");

        let snapshot = self.state.get();
        let inner = Arc::clone(self);
        let prev = Arc::clone(&snapshot);
        let chain = plugin::compose(Arc::clone(&self.plugins), move |next_state, next_action| {
            inner.complete(&prev, next_state, next_action)
        });

        chain.run(snapshot, action).shared()
    }

    /// Terminal step of the chain.
    fn complete(&self, prev: &Arc<S>, next_state: Arc<S>, action: Arc<A>) -> PluginFuture<S> {
        if !Arc::ptr_eq(prev, &next_state) {
            self.state.set(next_state);
        }

        // Register before announcing the action so no result can slip past.
        let results = result_stream(&self.results, &action);
        debug!(action = %action.name(), "Action dispatched");
        self.actions
            .publish(ActionContext::dispatched(Arc::clone(&action)));

        let actions = self.actions.clone();
        let forward = results.clone();
        tokio::spawn(async move {
            if let Some(context) = forward.await {
                debug!(
                    action = %context.action().name(),
                    status = %context.status(),
                    "Action completed"
                );
                actions.publish(context);
            }
        });

        create_dispatch_outcome(results, self.state.clone()).boxed()
    }

    fn report_errors<T>(&self, outcome: SharedOutcome<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let zone = Arc::clone(&self.zone);
        let handler = Arc::clone(&self.error_handler);
        tokio::spawn(async move {
            if let Err(error) = outcome.await {
                enter(&*zone, Domain::Tracked, || handler.handle_error(&error));
            }
        });
    }
}

/// Join per-action outcomes: all must resolve, the first failure wins.
///
/// Completes without a value as soon as any input does.
fn join_all<S>(outcomes: Vec<SharedOutcome<Arc<S>>>) -> SharedOutcome<Vec<Arc<S>>>
where
    S: Send + Sync + 'static,
{
    async move {
        let mut slots: Vec<Option<Arc<S>>> = vec![None; outcomes.len()];
        let mut pending: FuturesUnordered<_> = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| outcome.map(move |result| (index, result)))
            .collect();

        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(Some(state)) => slots[index] = Some(state),
                Ok(None) => return Ok(None),
                Err(error) => return Err(error),
            }
        }

        Ok(Some(slots.into_iter().flatten().collect()))
    }
    .boxed()
    .shared()
}

impl<S, A> Clone for Dispatcher<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A> fmt::Debug for Dispatcher<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("plugins_count", &self.inner.plugins.len())
            .field("platform", &self.inner.platform)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`Dispatcher`]
pub struct DispatcherBuilder<S, A> {
    state: StateCell<S>,
    plugins: PluginChain<S, A>,
    zone: Arc<dyn Zone>,
    error_handler: Arc<dyn ErrorHandler>,
    platform: Platform,
    config: DispatchConfig,
    actions: Option<ActionBus<A>>,
    results: Option<ResultBus<A>>,
}

impl<S, A> DispatcherBuilder<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    pub fn new(state: S) -> Self {
        Self::from_state_cell(StateCell::new(state))
    }

    /// Dispatch into an existing state cell.
    pub fn from_state_cell(state: StateCell<S>) -> Self {
        Self {
            state,
            plugins: PluginChain::new(),
            zone: Arc::new(NoopZone),
            error_handler: Arc::new(TracingErrorHandler),
            platform: Platform::default(),
            config: DispatchConfig::default(),
            actions: None,
            results: None,
        }
    }

    /// Append a plugin; plugins run in registration order.
    pub fn plugin<P: Plugin<S, A>>(mut self, plugin: P) -> Self {
        self.plugins.add(plugin);
        self
    }

    /// Append a closure plugin.
    pub fn plugin_fn<F>(self, name: &'static str, f: F) -> Self
    where
        F: Fn(Arc<S>, Arc<A>, Next<S, A>) -> PluginFuture<S> + Send + Sync + 'static,
    {
        self.plugin(from_fn(name, f))
    }

    pub fn zone(mut self, zone: impl Zone) -> Self {
        self.zone = Arc::new(zone);
        self
    }

    pub fn error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing action bus instead of creating one.
    pub fn action_bus(mut self, bus: ActionBus<A>) -> Self {
        self.actions = Some(bus);
        self
    }

    /// Use an existing result bus, e.g. one already shared with handlers.
    pub fn result_bus(mut self, bus: ResultBus<A>) -> Self {
        self.results = Some(bus);
        self
    }

    pub fn build(self) -> Dispatcher<S, A> {
        let actions = self.actions.unwrap_or_default();
        let results = self.results.unwrap_or_default();

        Dispatcher {
            inner: Arc::new(Inner {
                state: self.state,
                actions,
                results,
                plugins: self.plugins.into_shared(),
                zone: self.zone,
                error_handler: self.error_handler,
                platform: self.platform,
                config: self.config,
            }),
        }
    }
}

impl<S, A> fmt::Debug for DispatcherBuilder<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("plugins", &self.plugins)
            .field("platform", &self.platform)
            .field("config", &self.config)
            .finish()
    }
}
