//! # Coordinator: the crate's driving facade.
//!
//! ## Contents
//! - [`Coordinator`] submit/cancel/inspect/recover/shutdown surface
//! - [`CoordinatorBuilder`] wiring (config, shared store, subscribers)
//! - [`SubmitOptions`] per-submission parameter adjustments
//! - [`AdmissionPolicy`] behavior at the concurrency cap (reject or queue)
//! - `worker` (crate-internal) the per-instance attempt loop
//! - `admission` / `registry` (crate-internal) gate and instance map

mod admission;
mod builder;
mod core;
mod options;
mod registry;
mod shutdown;
mod worker;

pub use admission::AdmissionPolicy;
pub use builder::CoordinatorBuilder;
pub use self::core::{Coordinator, RecoveryReport};
pub use options::SubmitOptions;

pub(crate) use options::RunParams;
