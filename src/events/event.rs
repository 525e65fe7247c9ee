//! # Transition events.
//!
//! Every successful phase transition produces exactly one [`Event`]. The
//! event is appended to the instance history, written to the journal and
//! published on the bus before the transition call returns, so a subscriber
//! that replays history and then follows live events sees one gap-free
//! sequence per instance.
//!
//! ## Ordering guarantees
//! Each event carries a globally unique sequence number (`seq`) that
//! increases monotonically across all instances. Events of a single
//! instance are additionally ordered by construction: they are created
//! under that instance's state lock.
//!
//! ## Example
//! ```rust
//! use runjob::{Event, EventFilter, Phase};
//!
//! fn running(ev: &Event) -> bool {
//!     EventFilter::all().with_phase(Phase::Running).matches(ev)
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::instance::{Cause, InstanceId, Phase};
use crate::jobs::JobId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Ensures future sequence numbers start at or above `floor`.
///
/// Called by recovery after reading journaled events so that new events
/// never reuse or precede persisted sequence numbers.
pub(crate) fn advance_seq_floor(floor: u64) {
    let _ = EVENT_SEQ.fetch_max(floor, AtomicOrdering::Relaxed);
}

/// Record of one phase transition.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs and the journal)
/// - `attempt`: the instance's attempt counter at transition time (1-based)
/// - `cause`: why the transition happened, when there is a concrete reason
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Instance the transition belongs to.
    pub instance: InstanceId,
    /// Job definition the instance was submitted for.
    pub job: JobId,
    /// Phase before the transition.
    pub from: Phase,
    /// Phase after the transition.
    pub to: Phase,
    /// Attempt number (starting from 1).
    pub attempt: u32,
    /// Reason for the transition, if one applies.
    pub cause: Option<Cause>,
}

impl Event {
    /// Creates an event with the current timestamp and next sequence number.
    pub(crate) fn new(
        instance: InstanceId,
        job: JobId,
        from: Phase,
        to: Phase,
        attempt: u32,
        cause: Option<Cause>,
    ) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            instance,
            job,
            from,
            to,
            attempt,
            cause,
        }
    }

    /// True when the transition entered a terminal phase.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(from: Phase, to: Phase) -> Event {
        Event::new(
            InstanceId::new(),
            JobId::new("seq-test").unwrap(),
            from,
            to,
            1,
            None,
        )
    }

    #[test]
    fn sequence_numbers_increase_monotonically() {
        // Other tests share the global counter, so only relative order is
        // meaningful here.
        let a = ev(Phase::Created, Phase::Pending);
        let b = ev(Phase::Pending, Phase::Running);
        assert!(b.seq > a.seq, "later event must get a larger seq");
    }

    #[test]
    fn floor_advances_but_never_rewinds() {
        let before = ev(Phase::Created, Phase::Pending).seq;
        advance_seq_floor(before + 1000);
        let after = ev(Phase::Created, Phase::Pending).seq;
        assert!(after >= before + 1000, "seq must jump past the floor");

        advance_seq_floor(0);
        let still = ev(Phase::Created, Phase::Pending).seq;
        assert!(still > after, "a lower floor must not rewind the counter");
    }

    #[test]
    fn terminal_detection_follows_the_target_phase() {
        assert!(ev(Phase::Running, Phase::Completed).is_terminal());
        assert!(!ev(Phase::Running, Phase::Restarting).is_terminal());
    }

    #[test]
    fn event_serializes_with_cause_payload() {
        let event = Event::new(
            InstanceId::new(),
            JobId::new("serde-test").unwrap(),
            Phase::Running,
            Phase::Failed,
            2,
            Some(Cause::Exited { code: 3 }),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"from\":\"running\""));
        assert!(json.contains("\"to\":\"failed\""));
        assert!(json.contains("\"code\":3"));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, event.seq);
        assert_eq!(back.attempt, 2);
    }
}
