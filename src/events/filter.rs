//! # Subscription filters.
//!
//! An [`EventFilter`] narrows a stream to one instance, one job, or one
//! target phase. Unset dimensions match everything, so
//! [`EventFilter::all`] passes every event through.

use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::instance::{InstanceId, Phase};
use crate::jobs::JobId;

/// Conjunction of optional match criteria for [`Event`]s.
///
/// ```rust
/// use runjob::{EventFilter, Phase};
///
/// let failed = EventFilter::all().with_phase(Phase::Failed);
/// assert!(failed.instance().is_none());
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventFilter {
    instance: Option<InstanceId>,
    job: Option<JobId>,
    to: Option<Phase>,
}

impl EventFilter {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches only events of the given instance.
    pub fn for_instance(id: InstanceId) -> Self {
        Self {
            instance: Some(id),
            ..Self::default()
        }
    }

    /// Matches only events of instances submitted for the given job.
    pub fn for_job(id: JobId) -> Self {
        Self {
            job: Some(id),
            ..Self::default()
        }
    }

    /// Restricts to transitions entering the given phase.
    pub fn with_phase(mut self, to: Phase) -> Self {
        self.to = Some(to);
        self
    }

    pub fn instance(&self) -> Option<&InstanceId> {
        self.instance.as_ref()
    }

    pub fn job(&self) -> Option<&JobId> {
        self.job.as_ref()
    }

    /// True when the event satisfies every set criterion.
    pub fn matches(&self, ev: &Event) -> bool {
        if let Some(id) = &self.instance {
            if &ev.instance != id {
                return false;
            }
        }
        if let Some(job) = &self.job {
            if &ev.job != job {
                return false;
            }
        }
        if let Some(to) = self.to {
            if ev.to != to {
                return false;
            }
        }
        true
    }
}
