//! Round driver
//!
//! A single task owns the consumer side of ordering and runs rounds strictly
//! one at a time:
//!
//! ```text
//!   OrderingService ──► stateful::verify ──► Agreement::agree ──► BlockCommitter
//!        ▲                    │                     │                  │
//!        │ requeue            ▼                     ▼                  ▼
//!        └────────────  on_verified_proposal   timeout/failure      on_block
//! ```
//!
//! A round starts when the round interval elapses, when the pending pool
//! reaches the proposal size, or when a [`RoundHandle`] asks for one. Rounds
//! started by the timer or the size trigger keep running back to back while a
//! full proposal is still waiting.

use crate::commit::BlockCommitter;
use crate::consensus::Agreement;
use crate::error::{AgreementFailure, Error, Result};
use crate::metrics::Metrics;
use crate::observer::Observers;
use crate::ordering::{OrderingGate, OrderingService};
use crate::response::{Reason, Response};
use crate::stateful;
use crate::status::StatusCache;
use ledger_core::{CommitError, Hash, Proposal};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// What one round did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Pool was empty
    Idle,

    /// Block committed
    Committed {
        /// New head height
        height: u64,
        /// New head hash
        block_hash: Hash,
    },

    /// Agreement failed; transactions returned to the pool
    Abandoned {
        /// Round height
        height: u64,
        /// Why agreement failed
        failure: AgreementFailure,
    },

    /// Agreed block was refused by the ledger
    CommitFailed {
        /// Round height
        height: u64,
        /// Ledger refusal
        error: CommitError,
    },
}

/// Message sent to the round driver
#[derive(Debug)]
pub(crate) enum RoundMessage {
    /// Run a round now
    Trigger {
        response: oneshot::Sender<RoundOutcome>,
    },

    /// Stop after the current round
    Shutdown,
}

/// Timing for the round driver
#[derive(Debug, Clone, Copy)]
pub(crate) struct RoundTiming {
    pub(crate) round_interval: Duration,
    pub(crate) agreement_timeout: Duration,
}

/// Actor that runs rounds
pub(crate) struct RoundDriver {
    ordering: OrderingService,
    gate: OrderingGate,
    committer: Arc<BlockCommitter>,
    agreement: Arc<dyn Agreement>,
    observers: Arc<Observers>,
    status: Arc<StatusCache>,
    metrics: Metrics,
    timing: RoundTiming,
    mailbox: mpsc::Receiver<RoundMessage>,
}

impl std::fmt::Debug for RoundDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundDriver")
            .field("pending", &self.ordering.pending())
            .field("timing", &self.timing)
            .finish()
    }
}

impl RoundDriver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ordering: OrderingService,
        gate: OrderingGate,
        committer: Arc<BlockCommitter>,
        agreement: Arc<dyn Agreement>,
        observers: Arc<Observers>,
        status: Arc<StatusCache>,
        metrics: Metrics,
        timing: RoundTiming,
        mailbox: mpsc::Receiver<RoundMessage>,
    ) -> Self {
        Self {
            ordering,
            gate,
            committer,
            agreement,
            observers,
            status,
            metrics,
            timing,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub(crate) async fn run(mut self) {
        // First tick one interval after start, not immediately
        let mut round_timer = interval_at(
            Instant::now() + self.timing.round_interval,
            self.timing.round_interval,
        );
        round_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let gate = self.gate.clone();

        loop {
            tokio::select! {
                msg = self.mailbox.recv() => {
                    match msg {
                        Some(RoundMessage::Trigger { response }) => {
                            let outcome = self.run_round().await;
                            let _ = response.send(outcome);
                        }
                        Some(RoundMessage::Shutdown) | None => break,
                    }
                }

                _ = round_timer.tick() => {
                    self.drain().await;
                }

                // Size threshold reached
                _ = gate.ready() => {
                    self.drain().await;
                }
            }
        }

        tracing::info!(pending = self.ordering.pending(), "Round driver stopped");
    }

    /// Run rounds until less than a full proposal is pending
    ///
    /// Stops after any round that did not commit, so a failing agreement
    /// waits for the next tick instead of spinning.
    async fn drain(&mut self) -> RoundOutcome {
        loop {
            let outcome = self.run_round().await;
            let backlog = self.ordering.pending() >= self.ordering.max_proposal_size();
            if !backlog || !matches!(outcome, RoundOutcome::Committed { .. }) {
                return outcome;
            }
        }
    }

    /// One proposal through verification, agreement and commit
    async fn run_round(&mut self) -> RoundOutcome {
        let ledger = Arc::clone(self.committer.ledger());
        let snapshot = ledger.snapshot();
        let head = snapshot.head();
        let height = head.height + 1;

        let proposal = match self.ordering.next_proposal(height) {
            Some(proposal) => Arc::new(proposal),
            None => return RoundOutcome::Idle,
        };
        let started = Instant::now();

        tracing::info!(
            height,
            transactions = proposal.transactions.len(),
            "Proposal emitted"
        );
        self.observers.publish_proposal(Arc::clone(&proposal));

        let (verified, world) = stateful::verify(&proposal, &snapshot);
        self.metrics
            .record_verified(verified.accepted.len(), verified.rejected.len());
        tracing::info!(
            height,
            accepted = verified.accepted.len(),
            rejected = verified.rejected.len(),
            "Proposal verified"
        );

        let verified = Arc::new(verified);
        self.observers.publish_verified(Arc::clone(&verified));
        self.committer.stage(&verified, world);

        let agreed = match tokio::time::timeout(
            self.timing.agreement_timeout,
            self.agreement.agree(&verified, &head),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AgreementFailure::Timeout {
                height,
                timeout_ms: self.timing.agreement_timeout.as_millis() as u64,
            }),
        };

        let block = match agreed {
            Ok(block) => block,
            Err(failure) => {
                self.abandon(proposal, &failure);
                return RoundOutcome::Abandoned { height, failure };
            }
        };

        match self.committer.commit(block) {
            Ok(block) => {
                for tx in &block.transactions {
                    self.status.record(Response::Committed {
                        tx_hash: tx.hash(),
                        height: block.height(),
                    });
                }
                for rejected in &verified.rejected {
                    self.status.record(Response::StatefulFailed {
                        hash: rejected.hash,
                        reason: Reason::from(&rejected.reason),
                    });
                }
                self.metrics
                    .record_commit(started.elapsed().as_secs_f64());

                RoundOutcome::Committed {
                    height: block.height(),
                    block_hash: block.hash(),
                }
            }
            Err(error) => {
                self.committer.discard_staged();
                tracing::error!(
                    height,
                    code = error.code(),
                    transactions = proposal.transactions.len(),
                    "Commit failed: {}",
                    error
                );
                let reason = Reason::new(error.code(), error.to_string());
                for tx in &proposal.transactions {
                    self.status.record(Response::StatefulFailed {
                        hash: tx.hash(),
                        reason: reason.clone(),
                    });
                }
                RoundOutcome::CommitFailed { height, error }
            }
        }
    }

    fn abandon(&mut self, proposal: Arc<Proposal>, failure: &AgreementFailure) {
        self.committer.discard_staged();
        self.metrics.record_abandoned();

        let transactions = match Arc::try_unwrap(proposal) {
            Ok(proposal) => proposal.transactions,
            Err(shared) => shared.transactions.clone(),
        };
        tracing::warn!(
            height = failure_height(failure),
            code = failure.code(),
            requeued = transactions.len(),
            "Round abandoned: {}",
            failure
        );
        self.ordering.requeue_front(transactions);
    }
}

fn failure_height(failure: &AgreementFailure) -> u64 {
    match failure {
        AgreementFailure::Timeout { height, .. } | AgreementFailure::Disagreement { height, .. } => {
            *height
        }
    }
}

/// Handle for sending messages to the round driver
#[derive(Debug, Clone)]
pub struct RoundHandle {
    sender: mpsc::Sender<RoundMessage>,
}

impl RoundHandle {
    pub(crate) fn new(sender: mpsc::Sender<RoundMessage>) -> Self {
        Self { sender }
    }

    /// Run a round now and report what it did
    pub async fn trigger(&self) -> Result<RoundOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoundMessage::Trigger { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Round driver mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Stop the driver once its current round ends
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RoundMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Round driver mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the round driver, returning its handle and task
pub(crate) fn spawn_round_driver(
    driver: impl FnOnce(mpsc::Receiver<RoundMessage>) -> RoundDriver,
) -> (RoundHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let driver = driver(rx);
    let task = tokio::spawn(driver.run());
    (RoundHandle::new(tx), task)
}
