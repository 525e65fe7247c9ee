//! # Lifecycle phases and terminal causes.
//!
//! [`Phase`] is the lifecycle vocabulary of a job instance; [`Cause`] explains
//! why a terminal (or restart) edge was taken.
//!
//! ## Transition table
//! ```text
//! CREATED ──► PENDING ──► RUNNING ──► COMPLETED   (exit code 0)
//!                │           ├──────► FAILED      (nonzero exit / signal / spawn failure, no retry left)
//!                │           ├──────► CANCELLED   (external cancel delivered)
//!                │           ├──────► TIMED_OUT   (attempt exceeded its limit; process terminated)
//!                │           └──────► RESTARTING ──► PENDING   (another attempt; counter +1)
//!                └─────────► CANCELLED            (cancel before start)
//! ```
//!
//! The four phases on the right are sinks: nothing leaves them. Any edge not
//! in the table is rejected fail-closed by the state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a job instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Accepted by the coordinator, not yet admitted by the concurrency gate.
    Created,
    /// Admitted; waiting for the process to start (or for a restart delay).
    Pending,
    /// A live OS process is associated with the instance.
    Running,
    /// An attempt finished and another one is owed; bookkeeping phase.
    Restarting,
    /// Terminal: the process exited with a success code.
    Completed,
    /// Terminal: the process failed and no attempts remain.
    Failed,
    /// Terminal: an external cancel was delivered and acknowledged.
    Cancelled,
    /// Terminal: the attempt outlived its time limit and was terminated.
    TimedOut,
}

impl Phase {
    /// Returns `true` for the four sink phases.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Completed | Phase::Failed | Phase::Cancelled | Phase::TimedOut
        )
    }

    /// Whether `self → to` is an edge of the lifecycle table.
    pub fn can_transition_to(self, to: Phase) -> bool {
        matches!(
            (self, to),
            (Phase::Created, Phase::Pending)
                | (Phase::Pending, Phase::Running)
                | (Phase::Pending, Phase::Cancelled)
                | (Phase::Running, Phase::Completed)
                | (Phase::Running, Phase::Failed)
                | (Phase::Running, Phase::Cancelled)
                | (Phase::Running, Phase::TimedOut)
                | (Phase::Running, Phase::Restarting)
                | (Phase::Restarting, Phase::Pending)
        )
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Pending => "pending",
            Phase::Running => "running",
            Phase::Restarting => "restarting",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
            Phase::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition was taken.
///
/// Every terminal event carries a cause; restart edges carry the exit that
/// triggered them. Progress edges (`created→pending`, `pending→running`,
/// `restarting→pending`) carry none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cause {
    /// The process exited on its own with this code.
    Exited { code: i32 },
    /// The process was terminated by a signal it did not handle.
    Signaled { signal: i32 },
    /// The process never started; the spawn itself failed.
    SpawnFailed { reason: String },
    /// The attempt exceeded its configured limit and was terminated.
    TimedOut { limit_ms: u64 },
    /// An external cancel request was honored.
    Cancelled,
    /// Supervision was lost (core restart or worker failure); the instance
    /// was deterministically driven to a terminal phase.
    Orphaned,
}

impl Cause {
    /// `true` only for a clean zero exit.
    pub fn is_success(&self) -> bool {
        matches!(self, Cause::Exited { code: 0 })
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Exited { code } => write!(f, "exit code {code}"),
            Cause::Signaled { signal } => write!(f, "signal {signal}"),
            Cause::SpawnFailed { reason } => write!(f, "spawn failed: {reason}"),
            Cause::TimedOut { limit_ms } => write!(f, "timed out after {limit_ms}ms"),
            Cause::Cancelled => f.write_str("cancelled"),
            Cause::Orphaned => f.write_str("orphaned"),
        }
    }
}
