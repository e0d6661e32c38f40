//! Error types and the global error handler

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// A cloneable, type-erased error value carried by an `Errored` action.
///
/// Outcomes are shared between every awaiter of a dispatch, so the error
/// behind them must be cheap to clone. The original error stays reachable
/// through [`ActionError::downcast_ref`].
#[derive(Clone)]
pub struct ActionError(Arc<dyn StdError + Send + Sync + 'static>);

impl ActionError {
    /// Wrap any error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    /// Stand-in for an `Errored` context published without an error value.
    pub fn unspecified() -> Self {
        Self::msg("action errored without an error value")
    }

    /// Attempt to view the wrapped error as a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Debug for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for ActionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

struct Message(String);

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// Failure surfaced through a dispatch outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// The action completed with an `Errored` terminal context.
    #[error("action `{action}` errored: {error}")]
    Action {
        action: &'static str,
        #[source]
        error: ActionError,
    },

    /// A plugin failed before the action reached the terminal step.
    #[error("plugin `{plugin}` failed: {error}")]
    Plugin {
        plugin: &'static str,
        #[source]
        error: ActionError,
    },
}

impl DispatchError {
    pub fn action(action: &'static str, error: impl Into<ActionError>) -> Self {
        Self::Action {
            action,
            error: error.into(),
        }
    }

    pub fn plugin(plugin: &'static str, error: impl Into<ActionError>) -> Self {
        Self::Plugin {
            plugin,
            error: error.into(),
        }
    }

    /// The error value carried by this failure.
    pub fn error(&self) -> &ActionError {
        match self {
            DispatchError::Action { error, .. } | DispatchError::Plugin { error, .. } => error,
        }
    }
}

/// Result of a dispatch.
///
/// `Ok(Some(value))` resolved with a value, `Ok(None)` completed without
/// one, `Err(_)` failed.
pub type DispatchOutcome<T> = Result<Option<T>, DispatchError>;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid dispatch config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives every error that reaches a dispatch outcome.
///
/// Called whether or not the caller awaits the dispatch handle, so failures
/// of fire-and-forget dispatches are still reported.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle_error(&self, error: &DispatchError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&DispatchError) + Send + Sync + 'static,
{
    fn handle_error(&self, error: &DispatchError) {
        self(error)
    }
}

/// Default handler: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorHandler;

impl ErrorHandler for TracingErrorHandler {
    fn handle_error(&self, error: &DispatchError) {
        tracing::error!(error = %error, "Unhandled dispatch error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded")]
    struct QuotaExceeded;

    #[test]
    fn test_action_error_display() {
        let err = ActionError::msg("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.clone().to_string(), "boom");
    }

    #[test]
    fn test_action_error_downcast() {
        let err = ActionError::new(QuotaExceeded);
        assert!(err.downcast_ref::<QuotaExceeded>().is_some());
        assert!(ActionError::msg("x").downcast_ref::<QuotaExceeded>().is_none());
    }

    #[test]
    fn test_dispatch_error_carries_source() {
        let err = DispatchError::action("Fail", "boom");
        assert_eq!(err.to_string(), "action `Fail` errored: boom");
        assert_eq!(err.error().to_string(), "boom");
        assert_eq!(StdError::source(&err).map(|s| s.to_string()).as_deref(), Some("boom"));

        let err = DispatchError::plugin("auth", "denied");
        assert_eq!(err.to_string(), "plugin `auth` failed: denied");
    }

    #[test]
    fn test_closure_error_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |error: &DispatchError| sink.lock().push(error.to_string());

        handler.handle_error(&DispatchError::action("Fail", "boom"));
        assert_eq!(seen.lock().as_slice(), ["action `Fail` errored: boom"]);
    }
}
