//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `pipeline_transactions_submitted_total` - Transactions submitted
//! - `pipeline_stateless_rejected_total` - Transactions failing stateless validation
//! - `pipeline_proposals_total` - Proposals emitted
//! - `pipeline_transactions_accepted_total` - Transactions accepted by stateful validation
//! - `pipeline_transactions_rejected_total` - Transactions rejected by stateful validation
//! - `pipeline_blocks_committed_total` - Blocks committed
//! - `pipeline_rounds_abandoned_total` - Rounds abandoned (agreement failure or timeout)
//! - `pipeline_queries_total` - Queries answered
//! - `pipeline_round_duration_seconds` - Proposal-to-commit latency

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions submitted
    pub submitted_total: IntCounter,

    /// Stateless rejections
    pub stateless_rejected_total: IntCounter,

    /// Proposals emitted
    pub proposals_total: IntCounter,

    /// Stateful acceptances
    pub accepted_total: IntCounter,

    /// Stateful rejections
    pub rejected_total: IntCounter,

    /// Blocks committed
    pub blocks_total: IntCounter,

    /// Rounds abandoned
    pub abandoned_rounds_total: IntCounter,

    /// Queries answered
    pub queries_total: IntCounter,

    /// Round duration histogram
    pub round_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("submitted_total", &self.submitted_total.get())
            .field("blocks_total", &self.blocks_total.get())
            .finish()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let round_duration = Histogram::with_opts(
            HistogramOpts::new(
                "pipeline_round_duration_seconds",
                "Proposal-to-commit latency",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5]),
        )?;
        registry.register(Box::new(round_duration.clone()))?;

        Ok(Self {
            submitted_total: counter(
                &registry,
                "pipeline_transactions_submitted_total",
                "Transactions submitted",
            )?,
            stateless_rejected_total: counter(
                &registry,
                "pipeline_stateless_rejected_total",
                "Transactions failing stateless validation",
            )?,
            proposals_total: counter(&registry, "pipeline_proposals_total", "Proposals emitted")?,
            accepted_total: counter(
                &registry,
                "pipeline_transactions_accepted_total",
                "Transactions accepted by stateful validation",
            )?,
            rejected_total: counter(
                &registry,
                "pipeline_transactions_rejected_total",
                "Transactions rejected by stateful validation",
            )?,
            blocks_total: counter(
                &registry,
                "pipeline_blocks_committed_total",
                "Blocks committed",
            )?,
            abandoned_rounds_total: counter(
                &registry,
                "pipeline_rounds_abandoned_total",
                "Rounds abandoned",
            )?,
            queries_total: counter(&registry, "pipeline_queries_total", "Queries answered")?,
            round_duration,
            registry,
        })
    }

    /// Record a submission and whether it passed stateless validation
    pub fn record_submission(&self, count: usize, valid: bool) {
        self.submitted_total.inc_by(count as u64);
        if !valid {
            self.stateless_rejected_total.inc_by(count as u64);
        }
    }

    /// Record a verified proposal
    pub fn record_verified(&self, accepted: usize, rejected: usize) {
        self.proposals_total.inc();
        self.accepted_total.inc_by(accepted as u64);
        self.rejected_total.inc_by(rejected as u64);
    }

    /// Record a commit and the round's duration
    pub fn record_commit(&self, duration_seconds: f64) {
        self.blocks_total.inc();
        self.round_duration.observe(duration_seconds);
    }

    /// Record an abandoned round
    pub fn record_abandoned(&self) {
        self.abandoned_rounds_total.inc();
    }

    /// Record an answered query
    pub fn record_query(&self) {
        self.queries_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
