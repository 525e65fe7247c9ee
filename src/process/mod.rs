//! # Process supervision: spawn, capture, terminate.
//!
//! One attempt maps to one child process. [`supervisor`] owns the spawn
//! and wait/terminate logic, [`output`] the bounded capture buffers.

mod output;
mod supervisor;

pub use output::CapturedOutput;

pub(crate) use supervisor::{spawn, ProcessOutcome};
