//! Ledger Core
//!
//! Committed-state layer of the transaction pipeline: identities, commands,
//! world state, blocks and their storage.
//!
//! # Architecture
//!
//! - **Block Sourcing**: World state is derived from committed blocks only
//! - **Single Writer**: [`Ledger::commit`] is the only path that mutates committed state
//! - **Snapshots**: Readers hold an immutable [`StateSnapshot`] of one height
//! - **Merkle Roots**: Block headers commit to accepted and rejected transaction hashes
//!
//! # Invariants
//!
//! - Asset conservation: transfers never change the total supply
//! - Deterministic replay: same blocks → same state
//! - Append-only: committed blocks are never modified or deleted
//! - Atomicity: a transaction applies all of its commands or none

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod command;
pub mod config;
pub mod crypto;
pub mod error;
pub mod genesis;
pub mod ledger;
pub mod permission;
pub mod query;
pub mod state;
pub mod storage;
pub mod types;

// Re-exports
pub use command::Command;
pub use config::Config;
pub use crypto::{Ed25519Verifier, KeyPair, SignatureVerifier};
pub use error::{CommitError, Error, Result, StatefulError};
pub use ledger::{Ledger, StateSnapshot};
pub use permission::Permission;
pub use query::{QueryRequest, QueryResult};
pub use state::WorldState;
pub use types::{
    AccountId, AssetId, Block, ChainHead, DomainId, Hash, Proposal, PublicKey, Query,
    RejectedTransaction, RoleName, Signature, Transaction, VerifiedProposal,
};
