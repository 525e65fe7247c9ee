//! # Instance lifecycle: phases, causes and state cells.
//!
//! One submission creates one instance. Its phase moves through the table
//! in [`phase`] (see that module's diagram), every movement is recorded as
//! an [`Event`](crate::Event), and [`InstanceSnapshot`] exposes the result
//! to callers.

mod phase;
mod state;

pub use phase::{Cause, Phase};
pub use state::{InstanceId, InstanceSnapshot};

pub(crate) use state::InstanceCell;
