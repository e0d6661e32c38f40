//! Action trait and lifecycle records

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// Trait for actions that can be dispatched
///
/// Actions are opaque commands. They travel through the pipeline as `Arc<A>`
/// and are correlated with their results by pointer identity, so an action
/// does not need to be `Clone` or carry an id:
/// - Debug: For debugging and logging
/// - Send + Sync + 'static: Shared between the dispatcher and its tasks
///
/// Use `#[derive(Action)]` from `flux-dispatch-macros` to auto-implement this trait.
pub trait Action: Debug + Send + Sync + 'static {
    /// Get the action name for logging and filtering
    fn name(&self) -> &'static str;

    /// Get a one-line summary for logs
    ///
    /// Defaults to the `Debug` representation.
    fn summary(&self) -> String {
        format!("{:?}", self)
    }
}

/// Lifecycle status of a dispatched action
///
/// `Dispatched` is informational. Only `Successful` and `Errored` complete a
/// dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Dispatched,
    Successful,
    Errored,
}

impl ActionStatus {
    /// Whether this status completes a dispatch.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionStatus::Dispatched)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Dispatched => "dispatched",
            ActionStatus::Successful => "successful",
            ActionStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action paired with a lifecycle status
///
/// Published on the action bus (all statuses) and on the result bus
/// (terminal statuses). Immutable once built.
pub struct ActionContext<A> {
    action: Arc<A>,
    status: ActionStatus,
    error: Option<ActionError>,
}

impl<A> ActionContext<A> {
    /// Build a context with an explicit status and optional error.
    pub fn new(action: Arc<A>, status: ActionStatus, error: Option<ActionError>) -> Self {
        Self {
            action,
            status,
            error,
        }
    }

    /// The informational event published when an action enters the pipeline.
    pub fn dispatched(action: Arc<A>) -> Self {
        Self::new(action, ActionStatus::Dispatched, None)
    }

    /// Terminal context for an action that completed normally.
    pub fn successful(action: Arc<A>) -> Self {
        Self::new(action, ActionStatus::Successful, None)
    }

    /// Terminal context for an action that failed with `error`.
    pub fn errored(action: Arc<A>, error: impl Into<ActionError>) -> Self {
        Self::new(action, ActionStatus::Errored, Some(error.into()))
    }

    pub fn action(&self) -> &Arc<A> {
        &self.action
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&ActionError> {
        self.error.as_ref()
    }

    /// Whether this context belongs to exactly this action instance.
    ///
    /// Compares pointers, not values: two equal actions dispatched as
    /// separate `Arc`s never match each other.
    #[inline]
    pub fn is_for(&self, action: &Arc<A>) -> bool {
        Arc::ptr_eq(&self.action, action)
    }
}

// Manual impls: `A` itself does not need to be `Clone`.
impl<A> Clone for ActionContext<A> {
    fn clone(&self) -> Self {
        Self {
            action: Arc::clone(&self.action),
            status: self.status,
            error: self.error.clone(),
        }
    }
}

impl<A: Debug> Debug for ActionContext<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("action", &self.action)
            .field("status", &self.status)
            .field("error", &self.error)
            .finish()
    }
}
