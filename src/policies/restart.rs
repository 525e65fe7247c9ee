//! # Restart policies for job instances.
//!
//! [`RestartPolicy`] determines whether an instance is given another attempt
//! after the process behind it exits.
//!
//! - [`RestartPolicy::Never`] the instance runs once and goes terminal.
//! - [`RestartPolicy::OnFailure`] failed attempts are retried, up to `max_attempts` total runs.
//! - [`RestartPolicy::Always`] every exit earns another run, up to `max_attempts` total runs.
//!
//! ## Choosing a policy
//!
//! **One-shot jobs** (run once, exit):
//! ```text
//! RestartPolicy::Never                          → single attempt, then COMPLETED or FAILED
//! ```
//!
//! **Flaky commands** (retry until it works):
//! ```text
//! RestartPolicy::OnFailure { max_attempts: 3 }  → nonzero exits retried twice more
//! ```
//!
//! **Cyclic jobs** (re-run after success too):
//! ```text
//! RestartPolicy::Always { max_attempts: 10 }    → ten runs, whatever the exit codes
//! ```
//!
//! The count is of **total attempts**, not of restarts: `max_attempts: 1`
//! behaves like `Never`. Cancellation and attempt timeout always override the
//! policy and end the instance.

use serde::{Deserialize, Serialize};

/// Policy controlling whether a finished attempt earns another run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Never restart: one attempt, then a terminal phase.
    Never,
    /// Restart after a failed attempt while attempts remain.
    OnFailure {
        /// Total attempts allowed (must be at least 1).
        max_attempts: u32,
    },
    /// Restart after every attempt, successful or not, while attempts remain.
    Always {
        /// Total attempts allowed (must be at least 1).
        max_attempts: u32,
    },
}

impl Default for RestartPolicy {
    /// Returns [`RestartPolicy::Never`].
    fn default() -> Self {
        RestartPolicy::Never
    }
}

impl RestartPolicy {
    /// Decides whether another attempt should run.
    ///
    /// `success` is whether the attempt that just finished exited cleanly;
    /// `attempt` is its 1-based number.
    pub fn allows_retry(&self, success: bool, attempt: u32) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnFailure { max_attempts } => !success && attempt < *max_attempts,
            RestartPolicy::Always { max_attempts } => attempt < *max_attempts,
        }
    }

    /// Total attempts this policy may consume.
    pub fn max_attempts(&self) -> u32 {
        match self {
            RestartPolicy::Never => 1,
            RestartPolicy::OnFailure { max_attempts } | RestartPolicy::Always { max_attempts } => {
                *max_attempts
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_stops_after_first_attempt() {
        let p = RestartPolicy::Never;
        assert!(!p.allows_retry(true, 1));
        assert!(!p.allows_retry(false, 1));
    }

    #[test]
    fn on_failure_retries_failures_only() {
        let p = RestartPolicy::OnFailure { max_attempts: 3 };
        assert!(p.allows_retry(false, 1));
        assert!(p.allows_retry(false, 2));
        assert!(!p.allows_retry(false, 3), "third attempt is the last");
        assert!(!p.allows_retry(true, 1), "success ends the run");
    }

    #[test]
    fn always_retries_successes_too() {
        let p = RestartPolicy::Always { max_attempts: 2 };
        assert!(p.allows_retry(true, 1));
        assert!(p.allows_retry(false, 1));
        assert!(!p.allows_retry(true, 2));
    }

    #[test]
    fn max_attempts_of_one_behaves_like_never() {
        let p = RestartPolicy::OnFailure { max_attempts: 1 };
        assert!(!p.allows_retry(false, 1));
    }
}
