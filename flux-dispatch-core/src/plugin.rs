//! Plugin chain with continuation-passing composition

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::error::{DispatchError, DispatchOutcome};
use crate::Action;

/// Future returned by every plugin and by the terminal step.
pub type PluginFuture<S> = BoxFuture<'static, DispatchOutcome<Arc<S>>>;

type Terminal<S, A> = Arc<dyn Fn(Arc<S>, Arc<A>) -> PluginFuture<S> + Send + Sync>;

/// A step in the dispatch pipeline
///
/// Plugins run in registration order. Each receives the state snapshot, the
/// action and a [`Next`] continuation. A plugin either hands on with
/// `next.run(state, action)` (possibly with a new state or action, possibly
/// from inside its returned future) or ends the chain by returning a future
/// of its own, e.g. [`resolve`] or [`reject`].
///
/// # Example
/// ```ignore
/// struct Audit;
///
/// impl<S: Send + Sync + 'static, A: Action> Plugin<S, A> for Audit {
///     fn handle(&self, state: Arc<S>, action: Arc<A>, next: Next<S, A>) -> PluginFuture<S> {
///         audit_log::record(action.name());
///         next.run(state, action)
///     }
/// }
/// ```
pub trait Plugin<S, A>: Send + Sync + 'static {
    /// Name used in logs and in [`DispatchError::Plugin`].
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn handle(&self, state: Arc<S>, action: Arc<A>, next: Next<S, A>) -> PluginFuture<S>;
}

/// Continuation into the rest of the chain.
///
/// Owned and `'static`, so plugins may move it into their future and call it
/// after awaiting other work.
pub struct Next<S, A> {
    plugins: Arc<[Arc<dyn Plugin<S, A>>]>,
    index: usize,
    terminal: Terminal<S, A>,
}

impl<S, A> Next<S, A>
where
    S: Send + Sync + 'static,
    A: Action,
{
    /// Invoke the next plugin, or the terminal step after the last one.
    pub fn run(self, state: Arc<S>, action: Arc<A>) -> PluginFuture<S> {
        match self.plugins.get(self.index).cloned() {
            Some(plugin) => {
                let next = Next {
                    plugins: self.plugins,
                    index: self.index + 1,
                    terminal: self.terminal,
                };
                plugin.handle(state, action, next)
            }
            None => (self.terminal)(state, action),
        }
    }

    /// Number of plugins still ahead of the terminal step.
    pub fn remaining(&self) -> usize {
        self.plugins.len().saturating_sub(self.index)
    }
}

impl<S, A> fmt::Debug for Next<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("plugins_count", &self.plugins.len())
            .finish()
    }
}

/// Compose `plugins` with `terminal` appended at the end.
pub fn compose<S, A, T>(plugins: Arc<[Arc<dyn Plugin<S, A>>]>, terminal: T) -> Next<S, A>
where
    T: Fn(Arc<S>, Arc<A>) -> PluginFuture<S> + Send + Sync + 'static,
{
    Next {
        plugins,
        index: 0,
        terminal: Arc::new(terminal),
    }
}

/// End the chain with a state.
pub fn resolve<S: Send + Sync + 'static>(state: Arc<S>) -> PluginFuture<S> {
    future::ready(Ok(Some(state))).boxed()
}

/// End the chain with an error.
pub fn reject<S: Send + Sync + 'static>(error: DispatchError) -> PluginFuture<S> {
    future::ready(Err(error)).boxed()
}

/// Ordered list of registered plugins
pub struct PluginChain<S, A> {
    plugins: Vec<Arc<dyn Plugin<S, A>>>,
}

impl<S, A> fmt::Debug for PluginChain<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginChain")
            .field("plugins_count", &self.plugins.len())
            .finish()
    }
}

impl<S: 'static, A: 'static> Default for PluginChain<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static, A: 'static> PluginChain<S, A> {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Append a plugin to the chain.
    pub fn add<P: Plugin<S, A>>(&mut self, plugin: P) {
        self.plugins.push(Arc::new(plugin));
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in invocation order.
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Freeze the chain for composition.
    pub fn into_shared(self) -> Arc<[Arc<dyn Plugin<S, A>>]> {
        self.plugins.into()
    }
}

/// Plugin built from a closure, see [`from_fn`].
pub struct FnPlugin<F> {
    name: &'static str,
    f: F,
}

/// Adapt a closure into a named plugin.
pub fn from_fn<S, A, F>(name: &'static str, f: F) -> FnPlugin<F>
where
    F: Fn(Arc<S>, Arc<A>, Next<S, A>) -> PluginFuture<S> + Send + Sync + 'static,
{
    FnPlugin { name, f }
}

impl<S, A, F> Plugin<S, A> for FnPlugin<F>
where
    S: 'static,
    A: 'static,
    F: Fn(Arc<S>, Arc<A>, Next<S, A>) -> PluginFuture<S> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(&self, state: Arc<S>, action: Arc<A>, next: Next<S, A>) -> PluginFuture<S> {
        (self.f)(state, action, next)
    }
}

impl<F> fmt::Debug for FnPlugin<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin").field("name", &self.name).finish()
    }
}

/// Plugin that logs actions (for debugging)
#[derive(Debug, Clone, Default)]
pub struct LoggingPlugin {
    /// Whether to log before handing on
    pub log_before: bool,
    /// Whether to log once the outcome settles
    pub log_after: bool,
}

impl LoggingPlugin {
    /// Create a new logging plugin with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging plugin that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl<S, A> Plugin<S, A> for LoggingPlugin
where
    S: Send + Sync + 'static,
    A: Action,
{
    fn name(&self) -> &'static str {
        "logging"
    }

    fn handle(&self, state: Arc<S>, action: Arc<A>, next: Next<S, A>) -> PluginFuture<S> {
        let name = action.name();
        if self.log_before {
            tracing::debug!(action = %name, "Dispatching action");
        }

        let outcome = next.run(state, action);
        if !self.log_after {
            return outcome;
        }

        async move {
            let result = outcome.await;
            match &result {
                Ok(Some(_)) => tracing::debug!(action = %name, "Action resolved"),
                Ok(None) => tracing::debug!(action = %name, "Action completed without state"),
                Err(error) => tracing::debug!(action = %name, error = %error, "Action failed"),
            }
            result
        }
        .boxed()
    }
}
