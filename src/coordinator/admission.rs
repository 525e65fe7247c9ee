//! # Concurrency gate.
//!
//! The gate bounds how many instances run at once. A submission acquires a
//! slot here before its instance may leave `Created`; the slot is released
//! when the instance reaches a terminal phase (the worker drops its permit).
//!
//! ## Rules
//! - With no limit configured every submission is admitted immediately.
//! - At the limit, [`AdmissionPolicy::Reject`] fails the submission and
//!   [`AdmissionPolicy::Queue`] parks it (bounded, FIFO) until a slot frees
//!   or the submission is cancelled.
//! - Queue capacity counts parked submissions only, not running ones.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::error::CoreError;

/// What happens to a submission that hits the concurrency limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Fail the submission with [`CoreError::LimitExceeded`].
    #[default]
    Reject,
    /// Park up to `capacity` submissions in FIFO order; beyond that fail
    /// with [`CoreError::QueueFull`].
    Queue { capacity: usize },
}

/// Outcome of the synchronous admission check at submit time.
#[derive(Debug)]
pub(crate) enum AdmissionTicket {
    /// No limit configured.
    Open,
    /// A slot was free; the permit is already held.
    Ready(OwnedSemaphorePermit),
    /// Parked; the worker waits on the semaphore.
    Wait(Arc<Semaphore>),
}

/// Result of waiting out a ticket.
pub(crate) enum Admitted {
    /// Run now; the permit (if any) is released when dropped.
    Proceed(Option<OwnedSemaphorePermit>),
    /// Cancelled or shut down before a slot freed.
    Aborted,
}

#[derive(Debug)]
pub(crate) struct AdmissionGate {
    semaphore: Option<Arc<Semaphore>>,
    policy: AdmissionPolicy,
    limit: usize,
    waiting: AtomicUsize,
}

impl AdmissionGate {
    pub(crate) fn new(cfg: &CoreConfig) -> Self {
        Self {
            semaphore: cfg.concurrency_limit().map(|n| Arc::new(Semaphore::new(n))),
            policy: cfg.admission,
            limit: cfg.max_concurrent,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Synchronous part of admission, called on the submit path.
    pub(crate) fn try_admit(&self) -> Result<AdmissionTicket, CoreError> {
        let Some(sem) = &self.semaphore else {
            return Ok(AdmissionTicket::Open);
        };
        match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Ok(AdmissionTicket::Ready(permit)),
            Err(TryAcquireError::Closed) => Err(CoreError::ShuttingDown),
            Err(TryAcquireError::NoPermits) => match self.policy {
                AdmissionPolicy::Reject => Err(CoreError::LimitExceeded { max: self.limit }),
                AdmissionPolicy::Queue { capacity } => {
                    let reserved = self
                        .waiting
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |w| {
                            (w < capacity).then_some(w + 1)
                        });
                    match reserved {
                        Ok(_) => Ok(AdmissionTicket::Wait(Arc::clone(sem))),
                        Err(_) => Err(CoreError::QueueFull { capacity }),
                    }
                }
            },
        }
    }

    /// Asynchronous part, run by the worker. Resolves once a slot frees,
    /// the submission is cancelled, or the gate closes.
    pub(crate) async fn admit(&self, ticket: AdmissionTicket, cancel: &CancellationToken) -> Admitted {
        match ticket {
            AdmissionTicket::Open => Admitted::Proceed(None),
            AdmissionTicket::Ready(permit) => Admitted::Proceed(Some(permit)),
            AdmissionTicket::Wait(sem) => {
                let outcome = tokio::select! {
                    permit = sem.acquire_owned() => match permit {
                        Ok(p) => Admitted::Proceed(Some(p)),
                        Err(_closed) => Admitted::Aborted,
                    },
                    _ = cancel.cancelled() => Admitted::Aborted,
                };
                self.waiting.fetch_sub(1, Ordering::AcqRel);
                outcome
            }
        }
    }

    /// Stops admitting: parked submissions abort, new ones see
    /// [`CoreError::ShuttingDown`].
    pub(crate) fn close(&self) {
        if let Some(sem) = &self.semaphore {
            sem.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(max: usize, admission: AdmissionPolicy) -> AdmissionGate {
        AdmissionGate::new(&CoreConfig {
            max_concurrent: max,
            admission,
            ..CoreConfig::default()
        })
    }

    #[tokio::test]
    async fn unlimited_gate_always_admits() {
        let gate = gate(0, AdmissionPolicy::Reject);
        for _ in 0..100 {
            let ticket = gate.try_admit().unwrap();
            assert!(matches!(
                gate.admit(ticket, &CancellationToken::new()).await,
                Admitted::Proceed(None)
            ));
        }
    }

    #[tokio::test]
    async fn reject_policy_fails_beyond_the_limit() {
        let gate = gate(1, AdmissionPolicy::Reject);
        let first = gate.try_admit().unwrap();
        let err = gate.try_admit().unwrap_err();
        assert_eq!(err, CoreError::LimitExceeded { max: 1 });

        // Releasing the held permit frees the slot again.
        drop(first);
        assert!(gate.try_admit().is_ok());
    }

    #[tokio::test]
    async fn queue_policy_parks_up_to_capacity() {
        let gate = gate(1, AdmissionPolicy::Queue { capacity: 1 });
        let _held = gate.try_admit().unwrap();
        assert!(matches!(gate.try_admit().unwrap(), AdmissionTicket::Wait(_)));
        let err = gate.try_admit().unwrap_err();
        assert_eq!(err, CoreError::QueueFull { capacity: 1 });
    }

    #[tokio::test]
    async fn parked_ticket_proceeds_once_a_slot_frees() {
        let gate = Arc::new(gate(1, AdmissionPolicy::Queue { capacity: 4 }));
        let held = match gate.try_admit().unwrap() {
            AdmissionTicket::Ready(p) => p,
            _ => panic!("first ticket must hold the slot"),
        };
        let ticket = gate.try_admit().unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                matches!(
                    gate.admit(ticket, &CancellationToken::new()).await,
                    Admitted::Proceed(Some(_))
                )
            })
        };
        tokio::task::yield_now().await;
        drop(held);
        assert!(waiter.await.unwrap(), "waiter must get the freed slot");
    }

    #[tokio::test]
    async fn cancelling_a_parked_ticket_aborts_it() {
        let gate = gate(1, AdmissionPolicy::Queue { capacity: 4 });
        let _held = gate.try_admit().unwrap();
        let ticket = gate.try_admit().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(gate.admit(ticket, &token).await, Admitted::Aborted));
    }

    #[tokio::test]
    async fn closing_the_gate_rejects_and_wakes_everyone() {
        let gate = gate(1, AdmissionPolicy::Queue { capacity: 4 });
        let _held = gate.try_admit().unwrap();
        let ticket = gate.try_admit().unwrap();
        gate.close();
        assert!(matches!(
            gate.admit(ticket, &CancellationToken::new()).await,
            Admitted::Aborted
        ));
        assert_eq!(gate.try_admit().unwrap_err(), CoreError::ShuttingDown);
    }
}
