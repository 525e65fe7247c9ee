//! # Instance state cells.
//!
//! An [`InstanceCell`] owns the authoritative state of one instance: its
//! current phase, attempt counter, full event history and captured output.
//! All mutation goes through [`InstanceCell::transition`], which enforces
//! the phase table fail-closed and performs the append/journal/publish
//! steps atomically under the cell's lock.
//!
//! ## Rules
//! - One transition produces exactly one [`Event`].
//! - History append, journal write and bus publish happen before
//!   `transition` returns; a journal write failure is logged and does not
//!   block the transition.
//! - The lock is a plain `std` mutex and is never held across an await.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::events::{Bus, Event};
use crate::instance::{Cause, Phase};
use crate::jobs::{JobDefinition, JobId};
use crate::journal::JournalWriter;
use crate::process::CapturedOutput;

/// Unique identity of one submitted instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Point-in-time view of one instance.
///
/// `cause` is the cause recorded on the most recent transition; for a
/// terminal instance that is the terminal cause.
#[derive(Clone, Debug)]
pub struct InstanceSnapshot {
    pub instance: InstanceId,
    pub job: JobId,
    pub phase: Phase,
    pub attempt: u32,
    pub cause: Option<Cause>,
    /// OS pid of the most recent attempt's process, if one was spawned.
    pub pid: Option<u32>,
    pub history: Vec<Event>,
    pub output: Option<CapturedOutput>,
    pub created_at: SystemTime,
    /// Timestamp of the last transition (`created_at` before the first one).
    pub updated_at: SystemTime,
}

#[derive(Debug)]
struct CellState {
    phase: Phase,
    attempt: u32,
    pid: Option<u32>,
    history: Vec<Event>,
    output: Option<CapturedOutput>,
}

/// Authoritative state of one instance.
///
/// Shared between the coordinator (queries, cancellation bookkeeping) and
/// the instance worker (transitions) behind an `Arc`.
#[derive(Debug)]
pub(crate) struct InstanceCell {
    id: InstanceId,
    def: Arc<JobDefinition>,
    bus: Bus,
    journal: Option<JournalWriter>,
    state: Mutex<CellState>,
    created_at: SystemTime,
}

impl InstanceCell {
    /// Fresh instance in `Created`.
    ///
    /// The id and timestamp are handed in so the journal header can be
    /// written before the cell exists.
    pub(crate) fn new(
        id: InstanceId,
        def: Arc<JobDefinition>,
        bus: Bus,
        journal: Option<JournalWriter>,
        created_at: SystemTime,
    ) -> Self {
        Self::resume(id, def, bus, journal, created_at, Vec::new())
    }

    /// Rebuilds a cell from journaled history during recovery.
    ///
    /// Phase and attempt are taken from the last recorded event; an empty
    /// history restores a `Created` instance.
    pub(crate) fn resume(
        id: InstanceId,
        def: Arc<JobDefinition>,
        bus: Bus,
        journal: Option<JournalWriter>,
        created_at: SystemTime,
        history: Vec<Event>,
    ) -> Self {
        let (phase, attempt) = match history.last() {
            Some(ev) => (ev.to, ev.attempt),
            None => (Phase::Created, 1),
        };
        Self {
            id,
            def,
            bus,
            journal,
            state: Mutex::new(CellState {
                phase,
                attempt,
                pid: None,
                history,
                output: None,
            }),
            created_at,
        }
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn job(&self) -> &JobId {
        self.def.id()
    }

    pub(crate) fn definition(&self) -> &Arc<JobDefinition> {
        &self.def
    }

    pub(crate) fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub(crate) fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Applies one phase transition.
    ///
    /// Rejected transitions leave every piece of state untouched. On
    /// success the event has been appended to history, offered to the
    /// journal and published on the bus by the time this returns.
    pub(crate) fn transition(
        &self,
        to: Phase,
        cause: Option<Cause>,
    ) -> Result<Event, TransitionError> {
        let mut st = self.lock();
        let from = st.phase;
        if !from.can_transition_to(to) {
            tracing::warn!(
                instance = %self.id,
                job = %self.def.id(),
                %from,
                %to,
                "rejected illegal transition"
            );
            return Err(TransitionError::Illegal { from, to });
        }
        debug_assert!(
            !to.is_terminal() || cause.is_some(),
            "terminal transitions must carry a cause"
        );
        if from == Phase::Restarting && to == Phase::Pending {
            st.attempt += 1;
        }
        let ev = Event::new(self.id, self.def.id().clone(), from, to, st.attempt, cause);
        if let Some(journal) = &self.journal {
            if let Err(err) = journal.append(&ev) {
                tracing::warn!(
                    instance = %self.id,
                    error = %err,
                    "journal append failed; transition proceeds in memory"
                );
            }
        }
        st.phase = to;
        st.history.push(ev.clone());
        // Published under the lock so bus order matches history order.
        self.bus.publish(ev.clone());
        Ok(ev)
    }

    /// Drives a non-terminal instance to its terminal phase after its
    /// worker is gone (crash recovery, worker panic, forced shutdown).
    pub(crate) fn resolve_abandoned(&self) {
        loop {
            let step = match self.phase() {
                Phase::Created | Phase::Restarting => (Phase::Pending, None),
                Phase::Pending => (Phase::Cancelled, Some(Cause::Orphaned)),
                Phase::Running => (Phase::Failed, Some(Cause::Orphaned)),
                _ => return,
            };
            if self.transition(step.0, step.1).is_err() {
                return;
            }
        }
    }

    pub(crate) fn set_output(&self, output: CapturedOutput) {
        self.lock().output = Some(output);
    }

    pub(crate) fn set_pid(&self, pid: Option<u32>) {
        self.lock().pid = pid;
    }

    pub(crate) fn snapshot(&self) -> InstanceSnapshot {
        let st = self.lock();
        InstanceSnapshot {
            instance: self.id,
            job: self.def.id().clone(),
            phase: st.phase,
            attempt: st.attempt,
            cause: st.history.last().and_then(|e| e.cause.clone()),
            pid: st.pid,
            history: st.history.clone(),
            output: st.output.clone(),
            created_at: self.created_at,
            updated_at: st.history.last().map_or(self.created_at, |e| e.at),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
