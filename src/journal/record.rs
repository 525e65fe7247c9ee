//! # Journal line format.
//!
//! One JSON object per line. The first line of a run file is a `header`
//! record carrying the identity, the definition as submitted, and the
//! restart/timeout actually in force (submission overrides applied); every
//! following line is one `transition` record, which is the on-disk form of
//! an [`Event`].
//!
//! ```text
//! {"record":"header","instance":"…","job":"build","created_at":{…},"definition":{…},"restart":{"policy":"never"},"timeout":null}
//! {"record":"transition","seq":12,"at":{…},"from":"created","to":"pending",…}
//! ```

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::instance::InstanceId;
use crate::jobs::{JobDefinition, JobId};
use crate::policies::RestartPolicy;

/// First line of every run file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct RunHeader {
    pub(crate) instance: InstanceId,
    pub(crate) job: JobId,
    pub(crate) created_at: SystemTime,
    pub(crate) definition: JobDefinition,
    /// Restart policy in force for this run; differs from the definition's
    /// when the submission overrode it.
    pub(crate) restart: RestartPolicy,
    /// Per-attempt timeout in force, if any.
    pub(crate) timeout: Option<Duration>,
}

/// One line of a run file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub(crate) enum JournalRecord {
    Header(RunHeader),
    Transition(Event),
}
