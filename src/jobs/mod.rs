//! # Job definitions and their store.
//!
//! ```text
//! JobDefinition::builder(..)          DefinitionStore
//!   .with_args(..)          build()   ┌──────────────┐   lookup()
//!   .with_restart(..)  ───────────▶   │ id → Arc<def>│ ───────────▶ submit
//!   .with_timeout(..)                 └──────────────┘
//! ```
//!
//! Definitions are validated once, stored behind `Arc`, and pinned per
//! attempt while running so replacement cannot change a run mid-flight.

mod definition;
mod store;

pub use definition::{DefinitionBuilder, JobDefinition, JobId};
pub use store::DefinitionStore;
