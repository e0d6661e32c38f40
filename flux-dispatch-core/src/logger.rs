//! Lifecycle logging with pattern-based filtering and in-memory storage
//!
//! [`ActionLogger`] follows an action bus from a background task, writes each
//! lifecycle event to `tracing` and keeps the recent ones in an [`ActionLog`]
//! ring buffer.
//!
//! # Example
//!
//! ```ignore
//! use flux_dispatch_core::logger::{ActionLogConfig, ActionLogger};
//! use tokio_util::sync::CancellationToken;
//!
//! let logger = ActionLogger::new(ActionLogConfig::default());
//! let cancel = CancellationToken::new();
//! let task = logger.spawn(dispatcher.actions(), cancel.clone());
//!
//! // ... dispatch actions ...
//!
//! for entry in logger.log().recent(10) {
//!     println!("{} {} {}", entry.elapsed_display(), entry.status, entry.summary);
//! }
//! cancel.cancel();
//! task.await?;
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionContext, ActionStatus};
use crate::bus::ActionBus;
use crate::Action;

/// Configuration for action logging with glob pattern filtering.
///
/// Patterns support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
///
/// # Examples
///
/// - `Load*` matches LoadUser, LoadSettings, etc.
/// - `*Failed` matches SaveFailed, LoadFailed, etc.
/// - `Tick` matches only Tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLoggerConfig {
    /// If non-empty, only log actions matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude actions matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
}

impl Default for ActionLoggerConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            // High-frequency noise
            exclude_patterns: vec!["Tick".to_string(), "Render".to_string()],
        }
    }
}

impl ActionLoggerConfig {
    /// Create a new config from comma-separated pattern strings
    ///
    /// `None` for `include` logs everything, `None` for `exclude` keeps the
    /// default excludes.
    ///
    /// # Example
    /// ```
    /// use flux_dispatch_core::logger::ActionLoggerConfig;
    ///
    /// let config = ActionLoggerConfig::new(Some("Load*,Save"), Some("Tick,Render"));
    /// assert!(config.should_log("LoadUser"));
    /// assert!(config.should_log("Save"));
    /// assert!(!config.should_log("Tick"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        let include_patterns = include.map(split_patterns).unwrap_or_default();
        let exclude_patterns = exclude
            .map(split_patterns)
            .unwrap_or_else(|| Self::default().exclude_patterns);

        Self {
            include_patterns,
            exclude_patterns,
        }
    }

    /// Create a config with specific pattern vectors
    pub fn with_patterns(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include_patterns: include,
            exclude_patterns: exclude,
        }
    }

    /// Log every action.
    pub fn all() -> Self {
        Self::with_patterns(Vec::new(), Vec::new())
    }

    /// Check if an action name should be logged based on include/exclude patterns
    pub fn should_log(&self, action_name: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self
                .include_patterns
                .iter()
                .any(|p| glob_match(p, action_name))
        {
            return false;
        }

        !self
            .exclude_patterns
            .iter()
            .any(|p| glob_match(p, action_name))
    }
}

fn split_patterns(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// One lifecycle event in the action log
#[derive(Debug, Clone)]
pub struct ActionLogEntry {
    /// Action name (from `Action::name()`)
    pub name: &'static str,
    /// Summary representation (from `Action::summary()`)
    pub summary: String,
    pub status: ActionStatus,
    /// Error message of an Errored event
    pub error: Option<String>,
    /// Sequence number for ordering
    pub sequence: u64,
    /// When the event was recorded
    pub timestamp: Instant,
}

impl ActionLogEntry {
    /// Time since this event was recorded
    pub fn elapsed(&self) -> std::time::Duration {
        self.timestamp.elapsed()
    }

    /// Format the elapsed time for display (e.g., "2.3s", "150ms")
    pub fn elapsed_display(&self) -> String {
        let elapsed = self.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.1}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }
}

/// Configuration for the action log ring buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLogConfig {
    /// Maximum number of entries to keep
    pub capacity: usize,
    pub filter: ActionLoggerConfig,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            filter: ActionLoggerConfig::default(),
        }
    }
}

impl ActionLogConfig {
    pub fn new(capacity: usize, filter: ActionLoggerConfig) -> Self {
        Self { capacity, filter }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }
}

/// In-memory ring buffer of recent lifecycle events
///
/// Older entries are discarded once capacity is reached.
#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionLogEntry>,
    config: ActionLogConfig,
    next_sequence: u64,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLog {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity),
            config,
            next_sequence: 0,
        }
    }

    /// Record a lifecycle event if it passes the filter.
    ///
    /// Returns the entry if it was recorded, None if filtered out.
    pub fn record<A: Action>(&mut self, context: &ActionContext<A>) -> Option<&ActionLogEntry> {
        let action = context.action();
        let name = action.name();
        if self.config.capacity == 0 || !self.config.filter.should_log(name) {
            return None;
        }

        let entry = ActionLogEntry {
            name,
            summary: action.summary(),
            status: context.status(),
            error: context.error().map(ToString::to_string),
            sequence: self.next_sequence,
            timestamp: Instant::now(),
        };
        self.next_sequence += 1;

        if self.entries.len() >= self.config.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.entries.back()
    }

    /// All entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter()
    }

    /// The most recent `count` entries, newest first
    pub fn recent(&self, count: usize) -> impl Iterator<Item = &ActionLogEntry> {
        self.entries.iter().rev().take(count)
    }

    /// Statuses recorded for actions named `name`, oldest first.
    pub fn lifecycle_of(&self, name: &str) -> Vec<ActionStatus> {
        self.entries
            .iter()
            .filter(|entry| entry.name == name)
            .map(|entry| entry.status)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn config(&self) -> &ActionLogConfig {
        &self.config
    }
}

/// Follows an action bus, logging to `tracing` and into a shared [`ActionLog`]
#[derive(Debug, Clone)]
pub struct ActionLogger {
    log: Arc<Mutex<ActionLog>>,
}

impl Default for ActionLogger {
    fn default() -> Self {
        Self::new(ActionLogConfig::default())
    }
}

impl ActionLogger {
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            log: Arc::new(Mutex::new(ActionLog::new(config))),
        }
    }

    /// Lock the action log for reading.
    pub fn log(&self) -> MutexGuard<'_, ActionLog> {
        self.log.lock()
    }

    /// Log one lifecycle event.
    pub fn observe<A: Action>(&self, context: &ActionContext<A>) {
        let mut log = self.log.lock();
        let Some(entry) = log.record(context) else {
            return;
        };

        match (entry.status, &entry.error) {
            (ActionStatus::Errored, Some(error)) => {
                tracing::warn!(action = %entry.name, error = %error, "Action errored")
            }
            (ActionStatus::Errored, None) => tracing::warn!(action = %entry.name, "Action errored"),
            (status, _) => tracing::debug!(
                action = %entry.name,
                status = %status,
                summary = %entry.summary,
                "action"
            ),
        }
    }

    /// Follow `bus` until `cancel` fires or the bus closes.
    ///
    /// The subscription is registered before this returns, so every event
    /// published afterwards is observed.
    pub fn spawn<A: Action>(
        &self,
        bus: &ActionBus<A>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut events = bus.subscribe();
        let logger = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(context) => logger.observe(&context),
                        None => break,
                    },
                }
            }
            tracing::debug!("Action logger stopped");
        })
    }
}

/// Simple glob pattern matching supporting `*` and `?`.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            // Let the last star swallow one more character.
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}
