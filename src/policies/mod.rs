//! Restart and retry policies.
//!
//! This module groups the knobs that control **if/when** an instance is given
//! another attempt and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RestartPolicy`] whether a finished attempt earns another run (never / on-failure / always)
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//!
//! ## Quick wiring
//! ```text
//! JobDefinition { restart: RestartPolicy, backoff: BackoffPolicy, timeout: Option<Duration> }
//!      └─► coordinator worker uses:
//!           - restart.allows_retry(success, attempt) to decide restart/terminal
//!           - backoff.next(retry) with the zero-based retry index to space attempts
//! ```
//!
//! ## Defaults
//! - `RestartPolicy::Never` (a job runs once unless asked otherwise).
//! - `BackoffPolicy::default()` → first=100ms, factor=1.0 (constant), max=30s, jitter=None.
//! - `JitterPolicy::None` by default; consider `Equal` for balanced randomness.

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
