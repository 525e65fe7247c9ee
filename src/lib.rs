//! # runjob
//!
//! **Runjob** is an embeddable job execution and monitoring core for Rust.
//!
//! It runs registered job definitions as supervised OS processes: every
//! submission becomes an instance with an explicit state machine, a bounded
//! capture of its output, an ordered stream of transition events, and an
//! optional durable journal that survives restarts. The crate is a building
//! block for schedulers, agents, and control planes that need reliable
//! process execution without owning the surrounding service.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  register(JobDefinition)      submit(&JobId, SubmitOptions)
//!          │                            │
//!          ▼                            ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Coordinator                                                     │
//! │  - DefinitionStore (validated, Arc-shared definitions)           │
//! │  - AdmissionGate (concurrency cap: reject or queue)              │
//! │  - Registry (live + terminal instances by InstanceId)            │
//! │  - Bus (broadcast of transition events)                          │
//! │  - SubscriberSet (per-subscriber bounded queues)                 │
//! │  - Journal (one JSONL file per instance, optional)               │
//! └──────┬──────────────────┬──────────────────┬─────────────────────┘
//!        ▼                  ▼                  ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │InstanceWorker│   │InstanceWorker│   │InstanceWorker│  (one task per
//!  │ attempt loop │   │ attempt loop │   │ attempt loop │   instance)
//!  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!         │ spawn / wait / terminate(grace)     │
//!         ▼                  ▼                  ▼
//!     OS process         OS process         OS process
//!
//!  Every accepted transition produces one Event:
//!    journal append ─► bus publish ─► subscriber fan-out
//!                               └───► EventStream consumers
//!                                     (subscribe / replay)
//! ```
//!
//! ### Instance lifecycle
//! ```text
//! CREATED ──► PENDING ──► RUNNING ──┬──► COMPLETED   (exit code 0)
//!                ▲                  ├──► FAILED      (non-zero, signal, spawn)
//!                │                  ├──► CANCELLED   (cooperative stop)
//!                │                  ├──► TIMED_OUT   (per-attempt limit)
//!                └── RESTARTING ◄───┘    (restart policy, backoff delay)
//!
//! PENDING ──► CANCELLED              (cancelled before a process existed)
//! ```
//! Terminal phases are frozen: every further transition attempt is rejected
//! and the instance keeps its final snapshot until reaped.
//!
//! ## Features
//! | Area            | Description                                                       | Key types / traits                          |
//! |-----------------|-------------------------------------------------------------------|---------------------------------------------|
//! | **Definitions** | Validate, register, replace and remove job templates.             | [`JobDefinition`], [`DefinitionStore`]      |
//! | **Execution**   | Submit, cancel, inspect and reap instances.                       | [`Coordinator`], [`SubmitOptions`]          |
//! | **Policies**    | Restart and backoff behavior per definition or per submission.    | [`RestartPolicy`], [`BackoffPolicy`]        |
//! | **Events**      | Ordered transition records, filtered streams, replay with dedup.  | [`Event`], [`EventFilter`], [`EventStream`] |
//! | **Subscribers** | Push-style fan-out with bounded queues and panic isolation.       | [`Subscribe`]                               |
//! | **Persistence** | Durable per-instance journal and startup recovery.                | [`RecoveryReport`], [`CoreConfig`]          |
//! | **Errors**      | Typed errors with stable labels for logs and metrics.             | [`CoreError`], [`DefinitionError`]          |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use runjob::{CoordinatorBuilder, CoreConfig, JobDefinition, JobId, StreamItem, SubmitOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = CoordinatorBuilder::new(CoreConfig::default()).build()?;
//!
//!     coordinator.register(
//!         JobDefinition::builder("hello", "/bin/sh")
//!             .with_args(["-c", "echo hello"])
//!             .build()?,
//!     )?;
//!
//!     let job = JobId::new("hello")?;
//!     let id = coordinator.submit(&job, SubmitOptions::new())?;
//!
//!     // Follow the instance to its terminal phase.
//!     let mut stream = coordinator.replay(&id)?;
//!     while let Some(item) = stream.next().await {
//!         if let StreamItem::Event(ev) = item {
//!             println!("{} -> {}", ev.from, ev.to);
//!             if ev.to.is_terminal() {
//!                 break;
//!             }
//!         }
//!     }
//!
//!     coordinator.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod config;
mod coordinator;
mod error;
mod events;
mod instance;
mod jobs;
mod journal;
mod policies;
mod process;
mod subscribers;

// ---- Public re-exports ----

pub use config::CoreConfig;
pub use coordinator::{
    AdmissionPolicy, Coordinator, CoordinatorBuilder, RecoveryReport, SubmitOptions,
};
pub use error::{
    CoreError, DefinitionError, JournalError, RuntimeError, SpawnError, TransitionError,
};
pub use events::{Event, EventFilter, EventStream, StreamItem};
pub use instance::{Cause, InstanceId, InstanceSnapshot, Phase};
pub use jobs::{DefinitionBuilder, DefinitionStore, JobDefinition, JobId};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use process::CapturedOutput;
pub use subscribers::Subscribe;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
