//! Error types used by the runjob core.
//!
//! Each surface of the core has its own small error enum:
//!
//! - [`DefinitionError`]: rejected at the definition store, never reaches the state machine.
//! - [`TransitionError`]: an illegal phase edge; rejected without side effects.
//! - [`SpawnError`]: the OS process could not be started.
//! - [`CoreError`]: errors surfaced by the coordinator façade (submit/cancel/get/reap).
//! - [`RuntimeError`]: failures of the runtime itself, such as an exceeded shutdown grace.
//! - [`JournalError`]: durable log I/O and encoding failures.
//!
//! All enums provide `as_label()` returning a short stable snake_case kind for
//! logs and metrics.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::instance::{InstanceId, Phase};
use crate::jobs::JobId;

/// # Errors raised while registering or replacing job definitions.
///
/// These are validation-time errors: they are returned synchronously by the
/// [`DefinitionStore`](crate::DefinitionStore) and never produce instance state.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DefinitionError {
    /// Static validation failed (empty command, bad identity, missing working
    /// directory, conflicting environment keys, zero restart attempts).
    #[error("invalid definition {id:?}: {reason}")]
    Invalid {
        /// The offending identity as given (may itself be invalid).
        id: String,
        /// What failed validation.
        reason: String,
    },

    /// A definition with the same identity is already registered.
    #[error("definition {id} already registered")]
    Duplicate { id: JobId },

    /// No definition with this identity exists.
    #[error("definition {id} not found")]
    NotFound { id: JobId },

    /// The definition is referenced by an instance that is currently running.
    #[error("definition {id} is in use by a running instance")]
    InUse { id: JobId },
}

impl DefinitionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use runjob::{DefinitionError, JobId};
    ///
    /// let id = JobId::new("echo-ok").unwrap();
    /// let err = DefinitionError::Duplicate { id };
    /// assert_eq!(err.as_label(), "duplicate_definition");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DefinitionError::Invalid { .. } => "invalid_definition",
            DefinitionError::Duplicate { .. } => "duplicate_definition",
            DefinitionError::NotFound { .. } => "definition_not_found",
            DefinitionError::InUse { .. } => "definition_in_use",
        }
    }
}

/// # Error raised by the instance state machine.
///
/// An illegal edge is rejected fail-closed: no history entry is appended, no
/// event is published, and the instance keeps its prior phase.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The requested edge is not part of the lifecycle transition table.
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: Phase, to: Phase },
}

impl TransitionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use runjob::{Phase, TransitionError};
    ///
    /// let err = TransitionError::Illegal { from: Phase::Completed, to: Phase::Running };
    /// assert_eq!(err.as_label(), "illegal_transition");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransitionError::Illegal { .. } => "illegal_transition",
        }
    }
}

/// # Failure to start the OS process behind an instance.
///
/// Raised for a missing executable, permission problems, or resource
/// exhaustion. Inside the state machine this is data, not an exception: the
/// worker converts it into a failure-or-restart transition with cause
/// [`Cause::SpawnFailed`](crate::Cause::SpawnFailed).
#[derive(Error, Debug)]
#[error("failed to spawn {program:?}: {source}")]
pub struct SpawnError {
    /// The program that was asked to run.
    pub program: String,
    /// The underlying OS error.
    #[source]
    pub source: std::io::Error,
}

impl SpawnError {
    pub fn as_label(&self) -> &'static str {
        "spawn_failed"
    }
}

/// # Errors surfaced by the coordinator façade.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    /// `submit` referenced a definition that is not registered.
    #[error("unknown definition {id}")]
    UnknownDefinition { id: JobId },

    /// The instance id does not name a live or archived instance.
    #[error("unknown instance {id}")]
    UnknownInstance { id: InstanceId },

    /// The concurrency cap is reached and the admission policy rejects.
    #[error("concurrency limit of {max} reached")]
    LimitExceeded { max: usize },

    /// The admission queue is full; the submission was not enqueued.
    #[error("admission queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// `reap` was called on an instance that has not reached a terminal phase.
    #[error("instance {id} is not terminal (phase {phase})")]
    NotTerminal { id: InstanceId, phase: Phase },

    /// The coordinator is shutting down and refuses new work.
    #[error("coordinator is shutting down")]
    ShuttingDown,
}

impl CoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use runjob::CoreError;
    ///
    /// let err = CoreError::LimitExceeded { max: 4 };
    /// assert_eq!(err.as_label(), "limit_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CoreError::UnknownDefinition { .. } => "unknown_definition",
            CoreError::UnknownInstance { .. } => "unknown_instance",
            CoreError::LimitExceeded { .. } => "limit_exceeded",
            CoreError::QueueFull { .. } => "queue_full",
            CoreError::NotTerminal { .. } => "not_terminal",
            CoreError::ShuttingDown => "shutting_down",
        }
    }
}

/// # Errors produced by the runtime as a whole.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace was exceeded; some instance workers had to be aborted.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Instances that did not stop in time.
        stuck: Vec<InstanceId>,
    },
}

impl RuntimeError {
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "grace_exceeded",
        }
    }
}

/// # Errors of the durable run journal.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum JournalError {
    /// Reading or writing a journal file failed.
    #[error("journal io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("journal record codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl JournalError {
    pub fn as_label(&self) -> &'static str {
        match self {
            JournalError::Io { .. } => "journal_io",
            JournalError::Codec(_) => "journal_codec",
        }
    }
}
