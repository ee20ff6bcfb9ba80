//! Pipeline facade
//!
//! Wires the stages together and exposes the client surface: submissions,
//! queries, subscriptions and status lookups.

use crate::commit::{BlockCommitter, CommitObserver};
use crate::config::Config;
use crate::consensus::Agreement;
use crate::error::{AwaitError, Error, Result, SequenceError};
use crate::metrics::Metrics;
use crate::observer::Observers;
use crate::ordering::{OrderingGate, OrderingService};
use crate::query::QueryProcessor;
use crate::response::{Reason, Response};
use crate::round::{spawn_round_driver, RoundDriver, RoundHandle, RoundOutcome, RoundTiming};
use crate::sequence::TransactionSequence;
use crate::stateless::StatelessValidator;
use crate::status::StatusCache;
use ledger_core::storage::{open_storage, BlockStorage};
use ledger_core::{
    Block, Ed25519Verifier, Hash, Ledger, Proposal, Query, SignatureVerifier, Transaction,
    VerifiedProposal,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Assembles a [`Pipeline`]
#[derive(Debug)]
pub struct PipelineBuilder {
    config: Config,
    genesis: Block,
    verifier: Arc<dyn SignatureVerifier>,
    agreement: Option<Arc<dyn Agreement>>,
    storage: Option<Arc<dyn BlockStorage>>,
}

impl PipelineBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Signature verifier (default: Ed25519)
    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Agreement service (required)
    pub fn agreement(mut self, agreement: Arc<dyn Agreement>) -> Self {
        self.agreement = Some(agreement);
        self
    }

    /// Block store (default: opened from the ledger configuration)
    pub fn storage(mut self, storage: Arc<dyn BlockStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Open the ledger and spawn the round driver
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(self) -> Result<Pipeline> {
        self.config.validate()?;

        let agreement = self
            .agreement
            .ok_or_else(|| Error::Config("No agreement service configured".to_string()))?;
        let storage = match self.storage {
            Some(storage) => storage,
            None => open_storage(&self.config.ledger)?,
        };

        let ledger = Arc::new(Ledger::open(storage, &self.genesis)?);
        let head = ledger.head();
        tracing::info!(height = head.height, head_hash = %head.hash, "Ledger opened");

        let validator = Arc::new(StatelessValidator::new(
            self.config.validation.clone(),
            self.verifier,
        ));
        let committer = Arc::new(BlockCommitter::new(Arc::clone(&ledger)));
        let observers = Arc::new(Observers::new(
            self.config.observation.channel_capacity,
            self.config.observation.excluded_retention_blocks,
        ));
        committer.register(observers.clone());

        let status = Arc::new(StatusCache::with_capacity(
            self.config.observation.status_capacity,
        ));
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        let (gate, ordering) = OrderingService::new(self.config.ordering.max_proposal_size);
        let timing = RoundTiming {
            round_interval: self.config.ordering.round_interval(),
            agreement_timeout: self.config.consensus.agreement_timeout(),
        };

        let (rounds, driver) = {
            let gate = gate.clone();
            let committer = Arc::clone(&committer);
            let observers = Arc::clone(&observers);
            let status = Arc::clone(&status);
            let metrics = metrics.clone();
            spawn_round_driver(move |mailbox| {
                RoundDriver::new(
                    ordering, gate, committer, agreement, observers, status, metrics, timing,
                    mailbox,
                )
            })
        };

        tracing::info!(
            max_proposal_size = self.config.ordering.max_proposal_size,
            round_interval_ms = self.config.ordering.round_interval_ms,
            agreement_timeout_ms = self.config.consensus.agreement_timeout_ms,
            "Pipeline started"
        );

        Ok(Pipeline {
            queries: QueryProcessor::new(Arc::clone(&validator), Arc::clone(&ledger)),
            config: self.config,
            validator,
            gate,
            ledger,
            committer,
            observers,
            status,
            metrics,
            rounds,
            driver: Mutex::new(Some(driver)),
        })
    }
}

/// Running transaction pipeline
pub struct Pipeline {
    config: Config,
    validator: Arc<StatelessValidator>,
    gate: OrderingGate,
    ledger: Arc<Ledger>,
    committer: Arc<BlockCommitter>,
    observers: Arc<Observers>,
    queries: QueryProcessor,
    status: Arc<StatusCache>,
    metrics: Metrics,
    rounds: RoundHandle,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("head", &self.ledger.head())
            .field("pending", &self.gate.pending())
            .finish()
    }
}

impl Pipeline {
    /// Builder over the given genesis block
    pub fn builder(genesis: Block) -> PipelineBuilder {
        PipelineBuilder {
            config: Config::default(),
            genesis,
            verifier: Arc::new(Ed25519Verifier),
            agreement: None,
            storage: None,
        }
    }

    /// Validate one transaction and queue it for ordering
    ///
    /// Returns the stateless outcome immediately; the transaction's final
    /// fate is observable through [`Pipeline::await_block`] or
    /// [`Pipeline::status`]. Rejected transactions are answered here only
    /// and never tracked.
    pub fn submit(&self, tx: Transaction) -> Response {
        let tx_hash = tx.hash();

        let response = match self.validator.validate(&tx) {
            Ok(()) => {
                let response = Response::StatelessValid { tx_hash };
                self.status.record(response.clone());
                self.gate.push(tx);
                tracing::debug!(tx_hash = %tx_hash, "Transaction queued");
                response
            }
            Err(err) => {
                tracing::warn!(tx_hash = %tx_hash, reason = err.code(), "Transaction rejected: {}", err);
                Response::StatelessFailed {
                    hash: tx_hash,
                    reason: Reason::from(&err),
                }
            }
        };

        self.metrics.record_submission(1, !response.is_failure());
        response
    }

    /// Validate `raw` as one all-or-nothing sequence
    pub fn build_sequence(
        &self,
        raw: Vec<Transaction>,
    ) -> std::result::Result<TransactionSequence, SequenceError> {
        TransactionSequence::build(raw, &self.validator, self.config.ordering.max_proposal_size)
    }

    /// Queue a built sequence as one unit; one response per member
    pub fn submit_sequence(&self, sequence: TransactionSequence) -> Vec<Response> {
        let responses: Vec<Response> = sequence
            .hashes()
            .into_iter()
            .map(|tx_hash| Response::StatelessValid { tx_hash })
            .collect();

        for response in &responses {
            self.status.record(response.clone());
        }
        tracing::debug!(transactions = sequence.len(), "Sequence queued");
        self.metrics.record_submission(sequence.len(), true);
        self.gate.push_sequence(sequence);

        responses
    }

    /// Build and submit a sequence in one step
    ///
    /// If any member fails, nothing is queued and every member is answered
    /// with `StatelessFailed`; the member at fault carries its own reason.
    pub fn submit_batch(&self, raw: Vec<Transaction>) -> Vec<Response> {
        let hashes: Vec<Hash> = raw.iter().map(Transaction::hash).collect();

        match self.build_sequence(raw) {
            Ok(sequence) => self.submit_sequence(sequence),
            Err(err) => {
                tracing::warn!(
                    transactions = hashes.len(),
                    reason = err.code(),
                    "Sequence rejected: {}",
                    err
                );
                let culprit = err.member_index();
                let responses: Vec<Response> = hashes
                    .iter()
                    .enumerate()
                    .map(|(index, hash)| {
                        let reason = match culprit {
                            Some(at) if at != index => Reason::new(
                                "SEQUENCE_REJECTED",
                                format!("rejected with its sequence: {}", err),
                            ),
                            _ => Reason::from(&err),
                        };
                        Response::StatelessFailed {
                            hash: *hash,
                            reason,
                        }
                    })
                    .collect();

                self.metrics.record_submission(hashes.len(), false);
                responses
            }
        }
    }

    /// Answer a signed query from committed state
    pub fn query(&self, query: &Query) -> Response {
        self.metrics.record_query();
        self.queries.answer(query)
    }

    /// Subscribe to proposals
    pub fn on_proposal(&self) -> broadcast::Receiver<Arc<Proposal>> {
        self.observers.on_proposal()
    }

    /// Subscribe to verified proposals
    pub fn on_verified_proposal(&self) -> broadcast::Receiver<Arc<VerifiedProposal>> {
        self.observers.on_verified_proposal()
    }

    /// Subscribe to committed blocks
    pub fn on_block(&self) -> broadcast::Receiver<Arc<Block>> {
        self.observers.on_block()
    }

    /// Wait for the block that accepts or excludes `tx_hash`
    pub async fn await_block(
        &self,
        tx_hash: Hash,
        timeout: Duration,
    ) -> std::result::Result<Arc<Block>, AwaitError> {
        self.observers
            .await_block(&self.ledger, tx_hash, timeout)
            .await
    }

    /// Latest known status of a transaction
    ///
    /// Falls back to the ledger for committed transactions the cache no
    /// longer tracks.
    pub fn status(&self, tx_hash: &Hash) -> Option<Response> {
        self.status.get(tx_hash).or_else(|| {
            self.ledger
                .transaction_height(tx_hash)
                .map(|height| Response::Committed {
                    tx_hash: *tx_hash,
                    height,
                })
        })
    }

    /// Register a synchronous commit observer
    pub fn register_commit_observer(&self, observer: Arc<dyn CommitObserver>) {
        self.committer.register(observer);
    }

    /// Run a round now instead of waiting for the interval
    pub async fn trigger_round(&self) -> Result<RoundOutcome> {
        self.rounds.trigger().await
    }

    /// Transactions waiting for a proposal
    pub fn pending(&self) -> usize {
        self.gate.pending()
    }

    /// Committed ledger
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Pipeline metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the round driver and wait for it to finish its current round
    pub async fn shutdown(&self) -> Result<()> {
        let driver = self.driver.lock().take();
        let Some(driver) = driver else {
            return Ok(());
        };

        self.rounds.shutdown().await?;
        driver
            .await
            .map_err(|e| Error::Concurrency(format!("Round driver failed: {}", e)))?;

        tracing::info!(height = self.ledger.head().height, "Pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::SoloAgreement;
    use ledger_core::genesis::Genesis;
    use ledger_core::storage::MemoryBlockStorage;
    use ledger_core::{Command, DomainId, KeyPair, RoleName};

    fn config() -> Config {
        let mut config = Config::default();
        config.ordering.round_interval_ms = 3_600_000;
        config.ordering.max_proposal_size = 100;
        config
    }

    async fn start(admin: &KeyPair) -> Pipeline {
        start_with(admin, config()).await
    }

    async fn start_with(admin: &KeyPair, config: Config) -> Pipeline {
        Pipeline::builder(Genesis::new(admin.public_key()).block(admin))
            .config(config)
            .agreement(Arc::new(SoloAgreement::new(KeyPair::generate())))
            .storage(Arc::new(MemoryBlockStorage::new()))
            .start()
            .await
            .unwrap()
    }

    fn create_domain_tx(keypair: &KeyPair, name: &str) -> Transaction {
        Transaction::builder(Genesis::admin_account())
            .command(Command::CreateDomain {
                domain_id: DomainId::new(name),
                default_role: RoleName::new("user"),
            })
            .sign(keypair)
    }

    #[tokio::test]
    async fn test_start_requires_agreement() {
        let admin = KeyPair::generate();
        let result = Pipeline::builder(Genesis::new(admin.public_key()).block(&admin))
            .storage(Arc::new(MemoryBlockStorage::new()))
            .start()
            .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_submit_records_status() {
        let admin = KeyPair::generate();
        let pipeline = start(&admin).await;
        let tx = create_domain_tx(&admin, "domain");

        let response = pipeline.submit(tx.clone());
        assert_eq!(response, Response::StatelessValid { tx_hash: tx.hash() });
        assert_eq!(pipeline.status(&tx.hash()), Some(response));
        assert_eq!(pipeline.pending(), 1);
        assert_eq!(pipeline.metrics().submitted_total.get(), 1);
    }

    #[tokio::test]
    async fn test_submit_batch_blames_culprit() {
        let admin = KeyPair::generate();
        let pipeline = start(&admin).await;
        let good = create_domain_tx(&admin, "good");
        let bad = Transaction::builder(Genesis::admin_account()).sign(&admin);

        let responses = pipeline.submit_batch(vec![good.clone(), bad.clone()]);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].reason().unwrap().code, "SEQUENCE_REJECTED");
        assert_eq!(responses[1].reason().unwrap().code, "EMPTY_COMMANDS");
        assert_eq!(pipeline.pending(), 0);
        assert!(pipeline.status(&good.hash()).is_none());
        assert!(pipeline.status(&bad.hash()).is_none());
    }

    #[tokio::test]
    async fn test_rejected_submissions_are_not_tracked() {
        let admin = KeyPair::generate();
        let pipeline = start(&admin).await;

        for i in 0..500u64 {
            let stale = Transaction::builder(Genesis::admin_account())
                .created_at(i)
                .command(Command::CreateDomain {
                    domain_id: DomainId::new(format!("stale{}", i)),
                    default_role: RoleName::new("user"),
                })
                .sign(&admin);
            let response = pipeline.submit(stale);
            assert_eq!(response.reason().unwrap().code, "STALE_TIMESTAMP");
        }

        assert!(pipeline.status.is_empty());
        assert_eq!(pipeline.pending(), 0);
        assert_eq!(pipeline.metrics().stateless_rejected_total.get(), 500);
    }

    #[tokio::test]
    async fn test_evicted_commit_still_reported() {
        let admin = KeyPair::generate();
        let mut config = config();
        config.observation.status_capacity = 1;
        let pipeline = start_with(&admin, config).await;

        let first = create_domain_tx(&admin, "first");
        let second = create_domain_tx(&admin, "second");
        pipeline.submit(first.clone());
        pipeline.trigger_round().await.unwrap();
        pipeline.submit(second.clone());

        assert_eq!(pipeline.status.len(), 1);
        assert_eq!(
            pipeline.status(&first.hash()),
            Some(Response::Committed {
                tx_hash: first.hash(),
                height: 2
            })
        );
        assert_eq!(
            pipeline.status(&second.hash()),
            Some(Response::StatelessValid {
                tx_hash: second.hash()
            })
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let admin = KeyPair::generate();
        let pipeline = start(&admin).await;
        pipeline.shutdown().await.unwrap();
        pipeline.shutdown().await.unwrap();
        assert!(pipeline.trigger_round().await.is_err());
    }
}
