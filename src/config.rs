//! # Global runtime configuration.
//!
//! [`CoreConfig`] defines the coordinator's behavior: shutdown grace,
//! concurrency limit and admission policy, bus capacity, process
//! termination grace, output capture bound and the journal directory.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use runjob::{AdmissionPolicy, CoreConfig};
//!
//! let mut cfg = CoreConfig::default();
//! cfg.max_concurrent = 4;
//! cfg.admission = AdmissionPolicy::Queue { capacity: 16 };
//! cfg.grace = Duration::from_secs(10);
//!
//! assert_eq!(cfg.concurrency_limit(), Some(4));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::coordinator::AdmissionPolicy;

/// Global configuration for the coordinator.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Maximum time to wait for graceful shutdown before force-terminating
    /// workers.
    pub grace: Duration,
    /// Maximum number of instances in `Running` at once (0 = unlimited).
    pub max_concurrent: usize,
    /// What happens to submissions beyond `max_concurrent`.
    pub admission: AdmissionPolicy,
    /// Capacity of the event bus ring.
    pub bus_capacity: usize,
    /// How long a child gets between SIGTERM and SIGKILL.
    pub terminate_grace: Duration,
    /// Captured bytes retained per stream per attempt (0 = discard output,
    /// still counted).
    pub output_limit: usize,
    /// Journal directory. `None` disables persistence; submit/cancel still
    /// work, nothing survives a restart.
    pub state_dir: Option<PathBuf>,
}

impl CoreConfig {
    /// Concurrency limit as an option (`None` = unlimited).
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        (self.max_concurrent > 0).then_some(self.max_concurrent)
    }
}

impl Default for CoreConfig {
    /// Provides a default configuration:
    /// - `grace = 30s`
    /// - `max_concurrent = 0` (unlimited)
    /// - `admission = Reject`
    /// - `bus_capacity = 1024`
    /// - `terminate_grace = 5s`
    /// - `output_limit = 64 KiB`
    /// - `state_dir = None` (no persistence)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            max_concurrent: 0,
            admission: AdmissionPolicy::default(),
            bus_capacity: 1024,
            terminate_grace: Duration::from_secs(5),
            output_limit: 64 * 1024,
            state_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_unlimited_concurrency() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.max_concurrent, 0);
        assert_eq!(cfg.concurrency_limit(), None);
    }

    #[test]
    fn nonzero_limit_is_passed_through() {
        let cfg = CoreConfig {
            max_concurrent: 2,
            ..CoreConfig::default()
        };
        assert_eq!(cfg.concurrency_limit(), Some(2));
    }
}
