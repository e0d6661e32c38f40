//! Core traits and types for flux-dispatch
//!
//! This crate provides an action dispatcher for applications with a single,
//! immutable state tree. Actions flow through an ordered plugin chain, the
//! state snapshot is replaced when a plugin produces a new one, and every
//! dispatch returns a handle that settles once something publishes the
//! action's terminal result.
//!
//! # Core Concepts
//!
//! - **Action**: Events that describe state changes, travelling as `Arc<A>`
//! - **StateCell**: Holder of the current `Arc<S>` snapshot
//! - **Plugin**: Pipeline step receiving state, action and a continuation
//! - **ActionBus / ResultBus**: Broadcast channels of lifecycle events and of
//!   terminal results
//! - **Zone**: Scheduling context the dispatch runs in
//!
//! # Basic Example
//!
//! ```ignore
//! use flux_dispatch_core::prelude::*;
//!
//! #[derive(Debug)]
//! enum CounterAction {
//!     Increment,
//! }
//!
//! impl Action for CounterAction {
//!     fn name(&self) -> &'static str {
//!         "Increment"
//!     }
//! }
//!
//! #[derive(Debug, Default)]
//! struct Counter {
//!     count: i32,
//! }
//!
//! let dispatcher = Dispatcher::builder(Counter::default())
//!     .plugin_fn("reduce", |state, action, next| {
//!         next.run(Arc::new(Counter { count: state.count + 1 }), action)
//!     })
//!     .build();
//!
//! let action = Arc::new(CounterAction::Increment);
//! let handle = dispatcher.dispatch(action.clone());
//! dispatcher.results().publish(ActionContext::successful(action));
//!
//! let state = handle.await?.expect("resolved with state");
//! assert_eq!(state.count, 1);
//! ```
//!
//! # Completing Actions
//!
//! The dispatcher never decides on its own that an action is done. Whatever
//! handles the action (a plugin, a task following the action bus, a test)
//! publishes exactly one terminal context on the result bus:
//!
//! ```ignore
//! let mut events = dispatcher.actions().subscribe();
//! let results = dispatcher.results().clone();
//!
//! tokio::spawn(async move {
//!     while let Some(context) = events.recv().await {
//!         if context.status() != ActionStatus::Dispatched {
//!             continue;
//!         }
//!         let action = context.action().clone();
//!         match run_side_effect(&action).await {
//!             Ok(()) => results.publish(ActionContext::successful(action)),
//!             Err(e) => results.publish(ActionContext::errored(action, e.to_string())),
//!         }
//!     }
//! });
//! ```
//!
//! An action that never receives its terminal context never settles.
//!
//! Buses never drop contexts: each subscriber has its own unbounded queue and
//! each pending dispatch its own waiter. On the client, callbacks registered
//! with [`DispatchHandle::on_settled`] run inside the tracked domain.

pub mod action;
pub mod bus;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod logger;
pub mod plugin;
pub mod state;
pub mod testing;
pub mod zone;

// Core trait exports
pub use action::{Action, ActionContext, ActionStatus};

// Dispatcher exports
pub use config::DispatchConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use handle::DispatchHandle;
pub use state::StateCell;

// Bus exports
pub use bus::{ActionBus, Bus, ResultBus};

// Error exports
pub use error::{
    ActionError, ConfigError, DispatchError, DispatchOutcome, ErrorHandler, TracingErrorHandler,
};

// Plugin exports
pub use plugin::{from_fn, FnPlugin, LoggingPlugin, Next, Plugin, PluginChain, PluginFuture};

// Zone exports
pub use zone::{Domain, NoopZone, Platform, Zone};

// Logger exports
pub use logger::{ActionLog, ActionLogConfig, ActionLogEntry, ActionLogger, ActionLoggerConfig};

// Testing exports
pub use testing::{EventRecorder, RecordingErrorHandler, TestHarness, TrackingZone};

/// Prelude for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::action::{Action, ActionContext, ActionStatus};
    pub use crate::bus::{ActionBus, ResultBus};
    pub use crate::config::DispatchConfig;
    pub use crate::dispatcher::{Dispatcher, DispatcherBuilder};
    pub use crate::error::{ActionError, DispatchError, DispatchOutcome, ErrorHandler};
    pub use crate::handle::DispatchHandle;
    pub use crate::plugin::{reject, resolve, LoggingPlugin, Next, Plugin, PluginFuture};
    pub use crate::state::StateCell;
    pub use crate::zone::{Platform, Zone};
}
