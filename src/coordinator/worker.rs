//! # Instance worker.
//!
//! One worker task drives one instance from admission to its terminal
//! phase. The worker owns the only mutation path for its instance, so the
//! phase table is enforced in a single place and two attempts of the same
//! instance can never overlap.
//!
//! ## Attempt loop
//! ```text
//!  admit ──► Created→Pending ──► spawn ──► Pending→Running ──► supervise
//!                 ▲                                               │
//!                 │           Restarting→Pending            exit/cancel/
//!                 └── backoff ◄── Running→Restarting ◄─────── timeout
//!                                                                │
//!                                      Completed / Failed / Cancelled / TimedOut
//! ```
//!
//! ## Rules
//! - Cancellation wins at every await point; a natural exit that beats the
//!   cancel keeps its own terminal phase.
//! - Timeout is terminal; the restart policy is never consulted for it.
//! - A spawn failure passes through `Running` so the recorded path stays
//!   inside the phase table.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::coordinator::admission::{Admitted, AdmissionGate, AdmissionTicket};
use crate::instance::{Cause, InstanceCell, Phase};
use crate::coordinator::options::RunParams;
use crate::jobs::DefinitionStore;
use crate::process::{self, CapturedOutput, ProcessOutcome};

pub(crate) struct InstanceWorker {
    pub(crate) cell: Arc<InstanceCell>,
    pub(crate) store: Arc<DefinitionStore>,
    pub(crate) params: RunParams,
    pub(crate) extra_env: Vec<(String, String)>,
    pub(crate) terminate_grace: Duration,
    pub(crate) output_limit: usize,
}

impl InstanceWorker {
    pub(crate) async fn run(
        self,
        gate: Arc<AdmissionGate>,
        ticket: AdmissionTicket,
        cancel: CancellationToken,
    ) {
        // Slot held until the worker returns; restarts of this instance do
        // not re-queue behind new submissions.
        let _permit = match gate.admit(ticket, &cancel).await {
            Admitted::Proceed(permit) => permit,
            Admitted::Aborted => {
                self.give_up_before_start();
                return;
            }
        };

        let mut attempt = match self.cell.transition(Phase::Pending, None) {
            Ok(ev) => ev.attempt,
            Err(_) => return,
        };

        loop {
            if cancel.is_cancelled() {
                let _ = self.cell.transition(Phase::Cancelled, Some(Cause::Cancelled));
                return;
            }

            let outcome = self.attempt_once(&cancel).await;
            self.cell.set_output(outcome.output);

            match outcome.cause {
                Cause::Cancelled => {
                    let _ = self.cell.transition(Phase::Cancelled, Some(Cause::Cancelled));
                    return;
                }
                Cause::TimedOut { .. } => {
                    let _ = self.cell.transition(Phase::TimedOut, Some(outcome.cause));
                    return;
                }
                cause => {
                    let success = cause.is_success();
                    let retry =
                        !cancel.is_cancelled() && self.params.restart.allows_retry(success, attempt);
                    if !retry {
                        let terminal = if success { Phase::Completed } else { Phase::Failed };
                        let _ = self.cell.transition(terminal, Some(cause));
                        return;
                    }

                    if self.cell.transition(Phase::Restarting, Some(cause)).is_err() {
                        return;
                    }
                    attempt = match self.cell.transition(Phase::Pending, None) {
                        Ok(ev) => ev.attempt,
                        Err(_) => return,
                    };

                    let delay = self.params.backoff.next(attempt - 2);
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancel.cancelled() => {
                            let _ = self.cell.transition(Phase::Cancelled, Some(Cause::Cancelled));
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Spawns and supervises one attempt. The run lease keeps the store
    /// from replacing or removing the definition while the attempt runs.
    async fn attempt_once(&self, cancel: &CancellationToken) -> ProcessOutcome {
        let _lease = self.store.lease(self.cell.job());

        match process::spawn(self.cell.definition(), &self.extra_env, self.output_limit) {
            Ok(child) => {
                self.cell.set_pid(child.pid());
                if self.cell.transition(Phase::Running, None).is_err() {
                    return ProcessOutcome {
                        cause: Cause::Cancelled,
                        output: CapturedOutput::default(),
                    };
                }
                child
                    .supervise(cancel, self.params.timeout, self.terminate_grace)
                    .await
            }
            Err(err) => {
                if self.cell.transition(Phase::Running, None).is_err() {
                    return ProcessOutcome {
                        cause: Cause::Cancelled,
                        output: CapturedOutput::default(),
                    };
                }
                ProcessOutcome {
                    cause: Cause::SpawnFailed {
                        reason: err.to_string(),
                    },
                    output: CapturedOutput::default(),
                }
            }
        }
    }

    /// Admission never happened; the instance is cancelled without a
    /// process ever existing.
    fn give_up_before_start(&self) {
        let _ = self.cell.transition(Phase::Pending, None);
        let _ = self.cell.transition(Phase::Cancelled, Some(Cause::Cancelled));
    }
}
