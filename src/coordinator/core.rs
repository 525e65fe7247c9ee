//! # Coordinator: submissions, instance registry, fan-out, shutdown.
//!
//! The [`Coordinator`] owns the event bus, the definition store, the
//! admission gate and the instance registry. `submit` spawns one worker task
//! per instance; everything else is bookkeeping around those workers.
//!
//! ## High-level architecture
//! ```text
//! submit(&JobId, SubmitOptions)
//!    │  lookup ──► DefinitionStore (Arc<JobDefinition> pinned for the run)
//!    │  admit ───► AdmissionGate (reject / queue, permit spans the run)
//!    │  header ──► Journal (one file per instance, best effort)
//!    └─► tokio::spawn(InstanceWorker::run) ──► Registry[InstanceId]
//!
//! Event flow:
//!   InstanceCell::transition ── publish ──► Bus ──┬──► listener ─► SubscriberSet
//!                                                 ├──► subscribe(filter) streams
//!                                                 └──► replay(id) streams
//!
//! Shutdown path:
//!   shutdown():
//!     runtime_token.cancel()  → workers stop cooperatively
//!     gate.close()            → parked submissions abort
//!     join workers (cfg.grace) → overrun: abort + force terminal phase
//!     flush listener, SubscriberSet::shutdown()
//!     Err(RuntimeError::GraceExceeded { stuck }) when anything overran
//! ```
//!
//! ## Rules
//! - All instance mutation goes through the instance's own worker; the
//!   coordinator only reads snapshots and flips cancellation tokens.
//! - `cancel` is idempotent: repeated calls and calls on finished instances
//!   succeed without producing events.
//! - Terminal instances stay queryable until `reap` removes them.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use futures::FutureExt;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::coordinator::admission::{AdmissionGate, AdmissionTicket};
use crate::coordinator::options::SubmitOptions;
use crate::coordinator::registry::{InstanceHandle, Registry};
use crate::coordinator::shutdown;
use crate::coordinator::worker::InstanceWorker;
use crate::error::{CoreError, DefinitionError, JournalError, RuntimeError};
use crate::events::{advance_seq_floor, Bus, Event, EventFilter, EventStream};
use crate::instance::{InstanceCell, InstanceId, InstanceSnapshot};
use crate::jobs::{DefinitionStore, JobDefinition, JobId};
use crate::journal::Journal;
use crate::subscribers::SubscriberSet;

/// What [`Coordinator::recover`] found in the state directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Instances rebuilt from journal files.
    pub restored: usize,
    /// Of those, instances that were still live on disk and were walked to a
    /// terminal phase with cause `Orphaned`.
    pub orphaned: usize,
}

/// Runs job instances and answers questions about them.
///
/// Built by [`CoordinatorBuilder`](crate::CoordinatorBuilder); shared as
/// `Arc<Coordinator>`.
pub struct Coordinator {
    cfg: CoreConfig,
    store: Arc<DefinitionStore>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    registry: Registry,
    journal: Option<Journal>,
    gate: Arc<AdmissionGate>,
    /// Parent of every per-instance token; cancelled once on shutdown.
    runtime_token: CancellationToken,
    /// Stops the subscriber listener after the final flush.
    flush_token: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Shorthand for [`CoordinatorBuilder::new`](crate::CoordinatorBuilder::new).
    pub fn builder(cfg: CoreConfig) -> crate::coordinator::builder::CoordinatorBuilder {
        crate::coordinator::builder::CoordinatorBuilder::new(cfg)
    }

    /// Wires the runtime together and starts the fan-out listener.
    ///
    /// Must run inside a tokio runtime.
    pub(crate) fn new(
        cfg: CoreConfig,
        store: Arc<DefinitionStore>,
        subs: Arc<SubscriberSet>,
        journal: Option<Journal>,
    ) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity);
        let gate = Arc::new(AdmissionGate::new(&cfg));
        let flush_token = CancellationToken::new();
        let listener = spawn_listener(&bus, Arc::clone(&subs), flush_token.clone());

        Arc::new(Self {
            cfg,
            store,
            bus,
            subs,
            registry: Registry::default(),
            journal,
            gate,
            runtime_token: CancellationToken::new(),
            flush_token,
            listener: Mutex::new(Some(listener)),
        })
    }

    // ---------------------------
    // Submitting and cancelling
    // ---------------------------

    /// Starts a new instance of a registered definition.
    ///
    /// Returns the instance id with the instance in `Created` and a worker
    /// task driving it; progress is observable via [`subscribe`](Self::subscribe),
    /// [`replay`](Self::replay) and [`get`](Self::get).
    ///
    /// Admission is decided here, synchronously: with the reject policy an
    /// over-limit submit fails with [`CoreError::LimitExceeded`]; with the
    /// queue policy it parks until a slot frees, or fails with
    /// [`CoreError::QueueFull`] when too many are already parked.
    pub fn submit(&self, job: &JobId, options: SubmitOptions) -> Result<InstanceId, CoreError> {
        if self.runtime_token.is_cancelled() {
            return Err(CoreError::ShuttingDown);
        }
        let def = self
            .store
            .lookup(job)
            .map_err(|_| CoreError::UnknownDefinition { id: job.clone() })?;
        let params = options.params(&def);
        let ticket = self.gate.try_admit()?;

        let id = InstanceId::new();
        let created_at = SystemTime::now();
        let writer = match self.journal.as_ref() {
            Some(journal) => match journal.writer(id, created_at, &def, params.restart, params.timeout) {
                Ok(writer) => Some(writer),
                Err(err) => {
                    tracing::warn!(
                        instance = %id,
                        error = %err,
                        "journal unavailable, instance runs without one"
                    );
                    None
                }
            },
            None => None,
        };

        let cell = Arc::new(InstanceCell::new(id, def, self.bus.clone(), writer, created_at));
        let cancel = self.runtime_token.child_token();
        let worker = InstanceWorker {
            cell: Arc::clone(&cell),
            store: Arc::clone(&self.store),
            params,
            extra_env: options.env().to_vec(),
            terminate_grace: self.cfg.terminate_grace,
            output_limit: self.cfg.output_limit,
        };
        let join = spawn_worker(worker, Arc::clone(&self.gate), ticket, cancel.clone());
        self.registry.insert(InstanceHandle::new(cell, cancel, Some(join)));
        Ok(id)
    }

    /// Requests cancellation of an instance.
    ///
    /// Idempotent: cancelling an already-cancelled or finished instance is a
    /// successful no-op and produces no event. Unknown (or reaped) ids are
    /// [`CoreError::UnknownInstance`].
    pub fn cancel(&self, id: &InstanceId) -> Result<(), CoreError> {
        let handle = self
            .registry
            .get(id)
            .ok_or(CoreError::UnknownInstance { id: *id })?;
        handle.cancel.cancel();
        Ok(())
    }

    // ---------------------------
    // Inspection
    // ---------------------------

    /// Snapshot of one instance.
    pub fn get(&self, id: &InstanceId) -> Result<InstanceSnapshot, CoreError> {
        let handle = self
            .registry
            .get(id)
            .ok_or(CoreError::UnknownInstance { id: *id })?;
        Ok(handle.cell.snapshot())
    }

    /// Recorded transition history of one instance, oldest first.
    pub fn history(&self, id: &InstanceId) -> Result<Vec<Event>, CoreError> {
        self.get(id).map(|snap| snap.history)
    }

    /// Snapshots of every instance still in the registry, oldest submission
    /// first. Terminal instances are included until reaped.
    pub fn list(&self) -> Vec<InstanceSnapshot> {
        let mut snapshots: Vec<InstanceSnapshot> = self
            .registry
            .all()
            .iter()
            .map(|handle| handle.cell.snapshot())
            .collect();
        snapshots.sort_by_key(|snap| snap.created_at);
        snapshots
    }

    /// Live event stream; events published before this call are not
    /// included. Use [`replay`](Self::replay) for catch-up semantics.
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.bus.subscribe(), filter)
    }

    /// Full event stream for one instance: its recorded history first, then
    /// live events, deduplicated so the seam neither loses nor repeats one.
    pub fn replay(&self, id: &InstanceId) -> Result<EventStream, CoreError> {
        let handle = self
            .registry
            .get(id)
            .ok_or(CoreError::UnknownInstance { id: *id })?;
        // Receiver first, snapshot second: anything between the two shows up
        // in both and is dropped from the live side by sequence number.
        let rx = self.bus.subscribe();
        let snap = handle.cell.snapshot();
        Ok(EventStream::with_history(
            rx,
            EventFilter::for_instance(*id),
            snap.history,
        ))
    }

    /// Removes a terminal instance from the registry and returns its final
    /// snapshot. Live instances are refused with [`CoreError::NotTerminal`].
    pub fn reap(&self, id: &InstanceId) -> Result<InstanceSnapshot, CoreError> {
        self.registry.remove_terminal(id)
    }

    // ---------------------------
    // Definition surface
    // ---------------------------

    /// Shared definition store, for surfaces the passthroughs below do not
    /// cover (such as `remove`).
    pub fn store(&self) -> &Arc<DefinitionStore> {
        &self.store
    }

    /// Registers a definition; see [`DefinitionStore::register`].
    pub fn register(&self, def: JobDefinition) -> Result<(), DefinitionError> {
        self.store.register(def)
    }

    /// Replaces a definition; see [`DefinitionStore::replace`].
    pub fn replace(&self, def: JobDefinition) -> Result<(), DefinitionError> {
        self.store.replace(def)
    }

    /// Looks up a definition; see [`DefinitionStore::lookup`].
    pub fn definition(&self, id: &JobId) -> Result<Arc<JobDefinition>, DefinitionError> {
        self.store.lookup(id)
    }

    /// Ids of all registered definitions.
    pub fn definitions(&self) -> Vec<JobId> {
        self.store.ids()
    }

    // ---------------------------
    // Recovery
    // ---------------------------

    /// Loads journaled runs from the state directory into the registry.
    ///
    /// Terminal runs come back as archived snapshots. Runs that were still
    /// live when the previous process died are walked to a terminal phase
    /// along legal edges with cause `Orphaned`; those transitions are
    /// journaled and published like any other. Call once at startup, before
    /// submitting; without a configured `state_dir` this is a no-op.
    pub fn recover(&self) -> Result<RecoveryReport, JournalError> {
        let Some(journal) = self.journal.as_ref() else {
            return Ok(RecoveryReport::default());
        };
        let loaded = journal.load_all()?;
        if let Some(max) = loaded.max_seq {
            // Fresh events must sort after everything already on disk.
            advance_seq_floor(max + 1);
        }

        let mut report = RecoveryReport::default();
        for run in loaded.runs {
            let id = run.header.instance;
            let live = !run.events.last().is_some_and(|ev| ev.to.is_terminal());
            let writer = if live {
                match journal.reopen(id) {
                    Ok(writer) => Some(writer),
                    Err(err) => {
                        tracing::warn!(
                            instance = %id,
                            error = %err,
                            "orphan resolution will not be journaled"
                        );
                        None
                    }
                }
            } else {
                None
            };

            let cell = Arc::new(InstanceCell::resume(
                id,
                Arc::new(run.header.definition),
                self.bus.clone(),
                writer,
                run.header.created_at,
                run.events,
            ));
            if live {
                cell.resolve_abandoned();
                report.orphaned += 1;
                tracing::info!(instance = %id, "orphaned instance resolved");
            }
            self.registry
                .insert(InstanceHandle::new(cell, self.runtime_token.child_token(), None));
            report.restored += 1;
        }
        Ok(report)
    }

    // ---------------------------
    // Shutdown
    // ---------------------------

    /// Stops accepting work, cancels every live instance and waits up to
    /// `cfg.grace` for workers to finish.
    ///
    /// Workers that overrun the grace window are aborted, their instances
    /// forced to a terminal phase, and the call ends with
    /// [`RuntimeError::GraceExceeded`] naming them. Subscribers receive all
    /// events published before the end of the wait. Idempotent.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.runtime_token.cancel();
        self.gate.close();

        let grace = self.cfg.grace;
        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();
        for handle in self.registry.all() {
            let Some(mut join) = handle.take_join() else {
                continue;
            };
            match tokio::time::timeout_at(deadline, &mut join).await {
                Ok(_) => {}
                Err(_) => {
                    join.abort();
                    handle.cell.resolve_abandoned();
                    stuck.push(handle.cell.id());
                }
            }
        }

        // Workers are done; every event is on the bus. Flush the fan-out.
        self.flush_token.cancel();
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
        self.subs.shutdown().await;

        if stuck.is_empty() {
            Ok(())
        } else {
            tracing::error!(stuck = stuck.len(), ?grace, "shutdown grace exceeded");
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    /// Blocks until the process receives a termination signal, then runs
    /// [`shutdown`](Self::shutdown).
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        if let Err(err) = shutdown::wait_for_termination_signal().await {
            tracing::warn!(error = %err, "signal listener failed, shutting down");
        }
        self.shutdown().await
    }

    /// Runtime configuration this coordinator was built with.
    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }
}

/// Forwards bus events to the subscriber set until told to flush.
///
/// The listener outlives worker cancellation on purpose: terminal events are
/// published after the runtime token fires, and subscribers must see them.
fn spawn_listener(bus: &Bus, subs: Arc<SubscriberSet>, flush: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = flush.cancelled() => break,
                item = rx.recv() => match item {
                    Ok(ev) => subs.emit_arc(Arc::new(ev)),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "fan-out listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
        loop {
            match rx.try_recv() {
                Ok(ev) => subs.emit_arc(Arc::new(ev)),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "fan-out listener lagged behind the bus");
                }
                Err(_) => break,
            }
        }
    })
}

/// Runs the worker with a panic fence: a panicking worker is contained to
/// its own instance, which is forced to a terminal phase.
fn spawn_worker(
    worker: InstanceWorker,
    gate: Arc<AdmissionGate>,
    ticket: AdmissionTicket,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let cell = Arc::clone(&worker.cell);
    tokio::spawn(async move {
        let run = AssertUnwindSafe(worker.run(gate, ticket, cancel)).catch_unwind();
        if run.await.is_err() {
            tracing::error!(instance = %cell.id(), "instance worker panicked");
            cell.resolve_abandoned();
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::coordinator::builder::CoordinatorBuilder;
    use crate::instance::{Cause, Phase};
    use crate::jobs::DefinitionBuilder;
    use crate::policies::RestartPolicy;

    fn sh(id: &str, script: &str) -> JobDefinition {
        JobDefinition::builder(id, "/bin/sh")
            .with_args(["-c", script])
            .build()
            .unwrap()
    }

    fn quick_coordinator() -> Arc<Coordinator> {
        CoordinatorBuilder::new(CoreConfig {
            grace: Duration::from_secs(2),
            terminate_grace: Duration::from_millis(300),
            ..CoreConfig::default()
        })
        .build()
        .unwrap()
    }

    async fn wait_terminal(coord: &Coordinator, id: &InstanceId) -> InstanceSnapshot {
        for _ in 0..600 {
            let snap = coord.get(id).expect("instance must stay queryable");
            if snap.phase.is_terminal() {
                return snap;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("instance never reached a terminal phase");
    }

    #[tokio::test]
    async fn submit_requires_a_registered_definition() {
        let coord = quick_coordinator();
        let ghost = JobId::new("never-registered").unwrap();
        let err = coord.submit(&ghost, SubmitOptions::new()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownDefinition { id } if id == ghost));
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn submitted_instance_completes_and_is_listed() {
        let coord = quick_coordinator();
        coord.register(sh("lister", "echo done")).unwrap();
        let job = JobId::new("lister").unwrap();
        let id = coord.submit(&job, SubmitOptions::new()).unwrap();

        let snap = wait_terminal(&coord, &id).await;
        assert_eq!(snap.phase, Phase::Completed);
        assert_eq!(snap.job, job);

        let listed = coord.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].instance, id);
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_fails_on_unknown_ids() {
        let coord = quick_coordinator();
        coord.register(sh("long", "sleep 30")).unwrap();
        let job = JobId::new("long").unwrap();
        let id = coord.submit(&job, SubmitOptions::new()).unwrap();

        coord.cancel(&id).unwrap();
        coord.cancel(&id).unwrap();
        let snap = wait_terminal(&coord, &id).await;
        assert_eq!(snap.phase, Phase::Cancelled);
        let events = coord.history(&id).unwrap();
        assert_eq!(
            events.iter().filter(|e| e.to == Phase::Cancelled).count(),
            1,
            "double cancel must not record a second event"
        );

        let unknown = InstanceId::new();
        assert!(matches!(
            coord.cancel(&unknown),
            Err(CoreError::UnknownInstance { .. })
        ));
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn reap_refuses_live_instances_then_removes_terminal_ones() {
        let coord = quick_coordinator();
        coord.register(sh("reapable", "sleep 30")).unwrap();
        let job = JobId::new("reapable").unwrap();
        let id = coord.submit(&job, SubmitOptions::new()).unwrap();

        // Let the worker reach Running before poking at it.
        for _ in 0..200 {
            if coord.get(&id).unwrap().phase == Phase::Running {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            coord.reap(&id),
            Err(CoreError::NotTerminal { .. })
        ));

        coord.cancel(&id).unwrap();
        wait_terminal(&coord, &id).await;
        let reaped = coord.reap(&id).unwrap();
        assert_eq!(reaped.phase, Phase::Cancelled);
        assert!(matches!(
            coord.get(&id),
            Err(CoreError::UnknownInstance { .. })
        ));
        assert!(matches!(
            coord.reap(&id),
            Err(CoreError::UnknownInstance { .. })
        ));
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn subscribe_sees_the_full_lifecycle_live() {
        let coord = quick_coordinator();
        coord.register(sh("streamed", "echo hi")).unwrap();
        let job = JobId::new("streamed").unwrap();

        let mut stream = coord.subscribe(EventFilter::for_job(job.clone()));
        let id = coord.submit(&job, SubmitOptions::new()).unwrap();

        let mut seen = Vec::new();
        while seen.last().map(|p: &Phase| p.is_terminal()) != Some(true) {
            match stream.next().await.expect("bus must stay open") {
                crate::events::StreamItem::Event(ev) => {
                    assert_eq!(ev.instance, id);
                    seen.push(ev.to);
                }
                crate::events::StreamItem::Dropped(_) => {}
            }
        }
        assert_eq!(seen, [Phase::Pending, Phase::Running, Phase::Completed]);
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn replay_covers_finished_instances() {
        let coord = quick_coordinator();
        coord.register(sh("replayed", "true")).unwrap();
        let job = JobId::new("replayed").unwrap();
        let id = coord.submit(&job, SubmitOptions::new()).unwrap();
        wait_terminal(&coord, &id).await;

        let mut stream = coord.replay(&id).unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            match stream.next().await.expect("history must be replayed") {
                crate::events::StreamItem::Event(ev) => seen.push(ev.to),
                crate::events::StreamItem::Dropped(_) => {}
            }
        }
        assert_eq!(seen, [Phase::Pending, Phase::Running, Phase::Completed]);
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_cancels_live_instances_and_refuses_new_work() {
        let coord = quick_coordinator();
        coord.register(sh("resident", "sleep 30")).unwrap();
        let job = JobId::new("resident").unwrap();
        let id = coord.submit(&job, SubmitOptions::new()).unwrap();

        coord.shutdown().await.unwrap();
        let snap = coord.get(&id).unwrap();
        assert!(snap.phase.is_terminal());
        assert_eq!(snap.phase, Phase::Cancelled);

        assert!(matches!(
            coord.submit(&job, SubmitOptions::new()),
            Err(CoreError::ShuttingDown)
        ));
        // Second shutdown is a no-op.
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stuck_worker_is_reported_and_forced_terminal() {
        let coord = CoordinatorBuilder::new(CoreConfig {
            grace: Duration::from_millis(200),
            // Longer than the shutdown grace, so the TERM-ignoring child
            // keeps its worker alive past the deadline.
            terminate_grace: Duration::from_secs(10),
            ..CoreConfig::default()
        })
        .build()
        .unwrap();
        coord.register(sh("stubborn", "trap '' TERM; sleep 30")).unwrap();
        let job = JobId::new("stubborn").unwrap();
        let id = coord.submit(&job, SubmitOptions::new()).unwrap();

        for _ in 0..200 {
            if coord.get(&id).unwrap().phase == Phase::Running {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }

        let err = coord.shutdown().await.unwrap_err();
        let RuntimeError::GraceExceeded { stuck, .. } = err;
        assert_eq!(stuck, [id]);

        let snap = coord.get(&id).unwrap();
        assert_eq!(snap.phase, Phase::Failed);
        assert_eq!(snap.cause, Some(Cause::Orphaned));
    }

    #[tokio::test]
    async fn recover_without_a_state_dir_is_a_no_op() {
        let coord = quick_coordinator();
        assert_eq!(coord.recover().unwrap(), RecoveryReport::default());
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn submit_options_can_cap_attempts() {
        let coord = quick_coordinator();
        let def = DefinitionBuilder::new("retrier", "/bin/sh")
            .with_args(["-c", "exit 7"])
            .with_restart(RestartPolicy::OnFailure { max_attempts: 5 })
            .build()
            .unwrap();
        coord.register(def).unwrap();
        let job = JobId::new("retrier").unwrap();

        let id = coord
            .submit(&job, SubmitOptions::new().with_restart(RestartPolicy::Never))
            .unwrap();
        let snap = wait_terminal(&coord, &id).await;
        assert_eq!(snap.phase, Phase::Failed);
        assert_eq!(snap.attempt, 1, "the override must win over the definition");
        coord.shutdown().await.unwrap();
    }
}
