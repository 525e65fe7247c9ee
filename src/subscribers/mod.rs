//! # Event subscribers.
//!
//! Subscribers observe the transition stream without being able to slow it
//! down. The coordinator runs a single listener on the bus and fans events
//! out through the `SubscriberSet`:
//!
//! ```text
//!   InstanceCell ── publish ──► Bus ──► listener ──► SubscriberSet
//!                                                        │
//!                                             ┌──────────┼──────────┐
//!                                             ▼          ▼          ▼
//!                                         LogWriter   metrics    custom…
//! ```
//!
//! Implement [`Subscribe`] and hand the subscriber to
//! [`CoordinatorBuilder::with_subscribers`](crate::CoordinatorBuilder::with_subscribers).

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;

pub(crate) use set::SubscriberSet;
