//! # Subscriber trait.
//!
//! `Subscribe` is the extension point for reacting to transition events.
//! Each subscriber is driven by a dedicated worker loop fed from a bounded
//! queue owned by the `SubscriberSet`.
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching, retries); they never block
//!   the publisher nor other subscribers.
//! - Each subscriber declares its queue capacity via
//!   [`Subscribe::queue_capacity`]. On overflow, events for that subscriber
//!   are dropped and the drop is logged.

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should
/// avoid blocking the async runtime.
///
/// ```rust
/// use async_trait::async_trait;
/// use runjob::{Event, Subscribe};
///
/// struct Audit;
///
/// #[async_trait]
/// impl Subscribe for Audit {
///     async fn on_event(&self, ev: &Event) {
///         let _ = ev; // write audit record
///     }
///     fn name(&self) -> &'static str {
///         "audit"
///     }
/// }
/// ```
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
