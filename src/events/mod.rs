//! Transition events: data model, broadcast bus and consumer streams.
//!
//! ## Contents
//! - [`Event`] one record per phase transition, with a global sequence
//! - [`EventFilter`] instance/job/phase match criteria
//! - [`EventStream`], [`StreamItem`] pull-based consumption with replay and
//!   an explicit dropped-events marker
//! - `Bus` (crate-internal) thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: every `InstanceCell::transition` call, synchronously.
//! - **Consumers**: the coordinator's subscriber listener, plus any
//!   [`EventStream`](crate::EventStream) handed out by
//!   [`Coordinator::subscribe`](crate::Coordinator::subscribe) or
//!   [`Coordinator::replay`](crate::Coordinator::replay).

mod bus;
mod event;
mod filter;
mod stream;

pub use event::Event;
pub use filter::EventFilter;
pub use stream::{EventStream, StreamItem};

pub(crate) use bus::Bus;
pub(crate) use event::advance_seq_floor;
