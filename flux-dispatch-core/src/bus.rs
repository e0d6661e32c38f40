//! Lossless buses for action lifecycle events and results

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::trace;

use crate::action::ActionContext;
use crate::Action;

type Subscribers<A> = Arc<Mutex<Vec<mpsc::UnboundedSender<ActionContext<A>>>>>;

/// Publish/subscribe channel of [`ActionContext`]s
///
/// Every subscriber sees every context published after it subscribed, in
/// publish order. Each subscriber has its own unbounded queue, so a slow
/// subscriber never loses contexts. Clones publish into the same channel;
/// subscribers see the end of their stream once every clone is dropped.
pub struct Bus<A> {
    subscribers: Subscribers<A>,
}

/// Lifecycle events: `Dispatched`, then the republished terminal context.
pub type ActionBus<A> = Bus<A>;

impl<A: Action> Bus<A> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Publish a context to all current subscribers.
    ///
    /// Publishing with no subscribers drops the context. Subscribers whose
    /// receiver is gone are pruned.
    pub fn publish(&self, context: ActionContext<A>) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(context.clone()).is_ok());
        if subscribers.is_empty() {
            trace!(
                action = %context.action().name(),
                status = %context.status(),
                "No bus subscribers"
            );
        }
    }

    /// Subscribe to contexts published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ActionContext<A>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Subscribe as a stream.
    ///
    /// The subscription is registered before this returns.
    pub fn stream(&self) -> impl Stream<Item = ActionContext<A>> + Send + Unpin + 'static {
        UnboundedReceiverStream::new(self.subscribe())
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl<A: Action> Default for Bus<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for Bus<A> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<A> fmt::Debug for Bus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

/// Pending waiters for one action, keyed by its allocation.
struct Waiters<A> {
    // Held so the address cannot be reused while someone waits on it.
    _action: Arc<A>,
    senders: Vec<oneshot::Sender<ActionContext<A>>>,
}

type Pending<A> = Arc<Mutex<HashMap<usize, Waiters<A>>>>;

fn key<A>(action: &Arc<A>) -> usize {
    Arc::as_ptr(action) as usize
}

/// Terminal contexts published by whatever completes an action.
///
/// Besides plain subscribers, a result bus keeps a table of waiters keyed by
/// action identity. A terminal context is handed to every waiter registered
/// for its action, however many other contexts were published meanwhile.
pub struct ResultBus<A> {
    bus: Bus<A>,
    pending: Pending<A>,
}

impl<A: Action> ResultBus<A> {
    pub fn new() -> Self {
        Self {
            bus: Bus::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish a context to the waiters of its action and to all subscribers.
    pub fn publish(&self, context: ActionContext<A>) {
        if context.status().is_terminal() {
            let waiters = self.pending.lock().remove(&key(context.action()));
            for tx in waiters.into_iter().flat_map(|w| w.senders) {
                // A waiter that gave up has dropped its receiver.
                let _ = tx.send(context.clone());
            }
        }
        self.bus.publish(context);
    }

    /// Wait for the next terminal context of `action`.
    ///
    /// The waiter is registered before this returns. The receiver errors if
    /// every clone of the bus is dropped first.
    pub fn wait_for(&self, action: &Arc<A>) -> oneshot::Receiver<ActionContext<A>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        let waiters = pending.entry(key(action)).or_insert_with(|| Waiters {
            _action: action.clone(),
            senders: Vec::new(),
        });
        waiters.senders.retain(|tx| !tx.is_closed());
        waiters.senders.push(tx);
        rx
    }

    /// Number of actions with at least one registered waiter.
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending.lock();
        pending.retain(|_, w| {
            w.senders.retain(|tx| !tx.is_closed());
            !w.senders.is_empty()
        });
        pending.len()
    }

    /// Subscribe to contexts published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ActionContext<A>> {
        self.bus.subscribe()
    }

    /// Subscribe as a stream.
    pub fn stream(&self) -> impl Stream<Item = ActionContext<A>> + Send + Unpin + 'static {
        self.bus.stream()
    }

    /// Number of live subscribers, not counting waiters.
    pub fn receiver_count(&self) -> usize {
        self.bus.receiver_count()
    }
}

impl<A: Action> Default for ResultBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for ResultBus<A> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<A> fmt::Debug for ResultBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultBus")
            .field("bus", &self.bus)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}
