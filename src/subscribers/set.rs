//! # Non-blocking fan-out over multiple subscribers.
//!
//! [`SubscriberSet`] distributes each event to every subscriber without
//! awaiting their processing.
//!
//! ## Architecture
//! ```text
//!    emit_arc(Arc<Event>)
//!        │                       (Arc-clone per subscriber)
//!        ├───────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├───────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └───────────────► [queue SN] ─► worker SN ─► on_event()
//! ```
//!
//! ## Rules
//! - Per-subscriber FIFO; no ordering across subscribers.
//! - Overflow drops the event for that subscriber only, counted and logged.
//! - A panicking subscriber is caught and logged; its worker keeps running
//!   and other subscribers are unaffected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::Event;
use crate::subscribers::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
    dropped: Arc<AtomicU64>,
}

/// Fan-out with per-subscriber bounded queues and worker tasks.
///
/// Held by the coordinator behind a shared reference; `shutdown` therefore
/// takes `&self` and drains the channel list in place.
pub(crate) struct SubscriberSet {
    channels: Mutex<Vec<SubscriberChannel>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber.
    #[must_use]
    pub(crate) fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let dropped = Arc::new(AtomicU64::new(0));

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = panic_message(panic_err.as_ref());
                        tracing::error!(subscriber = sub.name(), panic = %info, "subscriber panicked");
                    }
                }
            });

            channels.push(SubscriberChannel {
                name,
                sender: tx,
                dropped,
            });
            workers.push(handle);
        }

        Self {
            channels: Mutex::new(channels),
            workers: Mutex::new(workers),
        }
    }

    /// Fans one event out to all subscribers (non-blocking).
    ///
    /// A full or closed queue drops the event for that subscriber; the
    /// running drop total is logged so the loss is visible.
    pub(crate) fn emit_arc(&self, event: Arc<Event>) {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        for channel in channels.iter() {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let total = channel.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber = channel.name,
                        dropped_total = total,
                        "subscriber queue full, event dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    let total = channel.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber = channel.name,
                        dropped_total = total,
                        "subscriber worker gone, event dropped"
                    );
                }
            }
        }
    }

    /// Closes all queues and waits for the workers to drain them.
    pub(crate) async fn shutdown(&self) {
        let channels = std::mem::take(&mut *self.channels.lock().unwrap_or_else(|e| e.into_inner()));
        drop(channels);
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in workers {
            let _ = handle.await;
        }
    }
}

fn panic_message(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
