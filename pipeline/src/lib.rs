//! Transaction Pipeline
//!
//! Carries client transactions from submission to a committed block, and
//! answers read queries against committed state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  submit / submit_sequence / query                   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ StatelessValidator, TransactionSequence
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │  OrderingGate ──► pending pool (SegQueue)           │
//! └────────────────────┬────────────────────────────────┘
//!                      │ round driver (one round at a time)
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │  Proposal → stateful::verify → Agreement → commit   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │  Ledger (blocks + world state snapshots)            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - A transaction failing stateless validation never reaches ordering
//! - Sequences are validated and ordered as one unit
//! - Proposal order is kept in the verified proposal and the block
//! - Ledger state changes only through block commit

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod commit;
pub mod config;
pub mod consensus;
pub mod error;
pub mod metrics;
pub mod observer;
pub mod ordering;
pub mod pipeline;
pub mod query;
pub mod response;
pub mod round;
pub mod sequence;
pub mod stateful;
pub mod stateless;
pub mod status;

// Re-exports
pub use commit::{BlockCommitter, CommitObserver};
pub use config::Config;
pub use consensus::{Agreement, SoloAgreement};
pub use error::{AgreementFailure, AwaitError, Error, Result, SequenceError, StatelessError};
pub use metrics::Metrics;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use response::{Reason, Response};
pub use round::RoundOutcome;
pub use sequence::TransactionSequence;
pub use stateless::StatelessValidator;
