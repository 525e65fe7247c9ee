//! # Broadcast bus for transition events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from instance workers under their state locks.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks or awaits; it calls
//!   `broadcast::Sender::send`.
//! - **Bounded capacity**: one ring buffer holds the most recent events for
//!   all receivers.
//! - **Lag is visible**: a receiver that falls behind observes
//!   `RecvError::Lagged(n)` and knows `n` events were skipped; it never sees
//!   a silently incomplete stream.
//! - **No persistence**: durability comes from the journal, not the bus.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for transition events.
///
/// Cheap to clone; every publisher holds a clone, receivers come from
/// [`Bus::subscribe`].
#[derive(Clone, Debug)]
pub(crate) struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus with the given ring capacity (clamped to at least 1).
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers the event is dropped; the journal and the
    /// instance history still hold it.
    pub(crate) fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver observing events published from now on.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
