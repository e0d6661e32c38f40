//! flux-dispatch: Action dispatch with plugin chains and replayable results
//!
//! Like Redux, but asynchronous. Actions run through an ordered plugin chain,
//! state lives in a single immutable snapshot, and every dispatch hands back a
//! handle that settles once the action's result is published.
//!
//! # Example
//! ```ignore
//! use flux_dispatch::prelude::*;
//!
//! #[derive(Action, Debug)]
//! enum CounterAction {
//!     Increment,
//!     Fail,
//! }
//!
//! #[derive(Debug, Default)]
//! struct Counter {
//!     count: i32,
//! }
//!
//! let dispatcher = Dispatcher::builder(Counter::default())
//!     .plugin(LoggingPlugin::new())
//!     .build();
//! ```

// Re-export everything from core
pub use flux_dispatch_core::*;
pub use flux_dispatch_core::assert_lifecycle;

// Re-export derive macros
pub use flux_dispatch_macros::Action;

/// Prelude for convenient imports
pub mod prelude {
    pub use flux_dispatch_core::prelude::*;

    // Derive macros
    pub use flux_dispatch_macros::Action;
}
