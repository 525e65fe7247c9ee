//! # Per-submission options.
//!
//! [`SubmitOptions`] adjusts a single submission without touching the
//! registered [`JobDefinition`](crate::JobDefinition). Unset fields fall back
//! to the definition; option environment entries are appended after the
//! definition's overlay, so a later key wins.

use std::time::Duration;

use crate::jobs::JobDefinition;
use crate::policies::{BackoffPolicy, RestartPolicy};

/// Submission-scoped parameter adjustments.
///
/// ```rust
/// use runjob::{RestartPolicy, SubmitOptions};
///
/// let opts = SubmitOptions::new()
///     .with_restart(RestartPolicy::Never)
///     .with_env("TRACE", "1");
/// ```
#[derive(Clone, Debug, Default)]
pub struct SubmitOptions {
    restart: Option<RestartPolicy>,
    backoff: Option<BackoffPolicy>,
    timeout: Option<Option<Duration>>,
    env: Vec<(String, String)>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = Some(restart);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Overrides the per-attempt timeout for this submission.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(Some(timeout));
        self
    }

    /// Removes the definition's timeout for this submission.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    /// Appends one environment entry, applied after the definition's overlay.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Extra environment entries for this submission.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Resolves effective run parameters against a definition.
    pub(crate) fn params(&self, def: &JobDefinition) -> RunParams {
        RunParams {
            restart: self.restart.unwrap_or(def.restart()),
            backoff: self.backoff.unwrap_or(def.backoff()),
            timeout: self.timeout.unwrap_or(def.timeout()),
        }
    }
}

/// Effective parameters for one instance, frozen at submission.
#[derive(Clone, Debug)]
pub(crate) struct RunParams {
    pub(crate) restart: RestartPolicy,
    pub(crate) backoff: BackoffPolicy,
    pub(crate) timeout: Option<Duration>,
}
