//! Shared state cell holding the current snapshot

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Holds the current immutable state snapshot.
///
/// Snapshots are `Arc<S>`; "changed" means a different `Arc`, never deep
/// equality. Clones share the same cell.
///
/// # Example
/// ```ignore
/// let cell = StateCell::new(Counter { count: 0 });
/// let before = cell.get();
/// cell.set(Arc::new(Counter { count: 1 }));
/// assert_eq!(before.count, 0);
/// assert_eq!(cell.get().count, 1);
/// ```
pub struct StateCell<S> {
    tx: Arc<watch::Sender<Arc<S>>>,
}

impl<S> StateCell<S> {
    /// Create a cell holding `state`.
    pub fn new(state: S) -> Self {
        Self::from_arc(Arc::new(state))
    }

    /// Create a cell holding an existing snapshot.
    pub fn from_arc(state: Arc<S>) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    /// Get the latest snapshot.
    pub fn get(&self) -> Arc<S> {
        Arc::clone(&self.tx.borrow())
    }

    /// Replace the snapshot and notify watchers.
    pub fn set(&self, state: Arc<S>) {
        self.tx.send_replace(state);
    }

    /// Derive a new snapshot from the current one and store it.
    pub fn update(&self, f: impl FnOnce(&S) -> S) -> Arc<S> {
        let next = Arc::new(f(&self.get()));
        self.set(Arc::clone(&next));
        next
    }

    /// Watch for snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.tx.subscribe()
    }
}

impl<S> Clone for StateCell<S> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<S: Default> Default for StateCell<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: fmt::Debug> fmt::Debug for StateCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("state", &*self.get())
            .field("watchers", &self.tx.receiver_count())
            .finish()
    }
}
