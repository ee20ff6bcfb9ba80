//! Error types for the ledger

use crate::permission::Permission;
use crate::types::{AccountId, AssetId, DomainId, Hash, PublicKey, RoleName};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (block store back-end)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Block not found
    #[error("Block not found: {0}")]
    BlockNotFound(u64),

    /// Commit rejected
    #[error("Commit rejected: {0}")]
    Commit(#[from] CommitError),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

/// Violation of a ledger invariant by a transaction or query.
///
/// Recorded per transaction in a verified proposal; never raised past the
/// stateful validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatefulError {
    /// Account does not exist
    #[error("account {0} does not exist")]
    NoAccount(AccountId),

    /// Domain does not exist
    #[error("domain {0} does not exist")]
    NoDomain(DomainId),

    /// Asset does not exist
    #[error("asset {0} does not exist")]
    NoAsset(AssetId),

    /// Role does not exist
    #[error("role {0} does not exist")]
    NoRole(RoleName),

    /// Block at the requested height is not committed
    #[error("no block at height {0}")]
    NoBlock(u64),

    /// Transaction is not committed
    #[error("transaction {0} is not committed")]
    NoTransaction(Hash),

    /// Account already exists
    #[error("account {0} already exists")]
    AccountExists(AccountId),

    /// Domain already exists
    #[error("domain {0} already exists")]
    DomainExists(DomainId),

    /// Asset already exists
    #[error("asset {0} already exists")]
    AssetExists(AssetId),

    /// Role already exists
    #[error("role {0} already exists")]
    RoleExists(RoleName),

    /// Role already appended to account
    #[error("account {account} already has role {role}")]
    RoleAlreadyAppended {
        /// Account
        account: AccountId,
        /// Role
        role: RoleName,
    },

    /// Signatory already attached to account
    #[error("{public_key} is already a signatory of {account}")]
    SignatoryExists {
        /// Account
        account: AccountId,
        /// Key
        public_key: PublicKey,
    },

    /// Signatory not attached to account
    #[error("{public_key} is not a signatory of {account}")]
    NoSignatory {
        /// Account
        account: AccountId,
        /// Key
        public_key: PublicKey,
    },

    /// Creator lacks a permission
    #[error("{account} lacks permission {permission:?}")]
    PermissionDenied {
        /// Acting account
        account: AccountId,
        /// Missing permission
        permission: Permission,
    },

    /// A signer of the transaction or query is not a signatory of its creator
    #[error("signer {public_key} is not a signatory of {account}")]
    NotSignatory {
        /// Creator account
        account: AccountId,
        /// Offending key
        public_key: PublicKey,
    },

    /// Fewer signatories signed than the creator account's quorum
    #[error("{signed} signatories signed, account quorum is {quorum}")]
    InsufficientSignatures {
        /// Account quorum
        quorum: u32,
        /// Signatures present
        signed: usize,
    },

    /// Balance too low
    #[error("insufficient balance of {asset}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Asset
        asset: AssetId,
        /// Current balance
        available: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// Amount has more fractional digits than the asset allows
    #[error("amount {amount} exceeds precision {precision} of {asset}")]
    PrecisionMismatch {
        /// Asset
        asset: AssetId,
        /// Asset precision
        precision: u8,
        /// Offending amount
        amount: Decimal,
    },

    /// Balance arithmetic overflow
    #[error("balance of {0} would overflow")]
    BalanceOverflow(AssetId),

    /// Quorum would exceed the number of signatories
    #[error("quorum {quorum} cannot be met by {signatories} signatories")]
    QuorumViolation {
        /// Requested or current quorum
        quorum: u32,
        /// Signatories left
        signatories: usize,
    },

    /// Transaction already committed in an earlier block
    #[error("transaction {0} is already committed")]
    AlreadyCommitted(Hash),

    /// Transaction appears earlier in the same proposal
    #[error("transaction {0} is duplicated in the proposal")]
    DuplicateInProposal(Hash),
}

impl StatefulError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            StatefulError::NoAccount(_) => "NO_ACCOUNT",
            StatefulError::NoDomain(_) => "NO_DOMAIN",
            StatefulError::NoAsset(_) => "NO_ASSET",
            StatefulError::NoRole(_) => "NO_ROLE",
            StatefulError::NoBlock(_) => "NO_BLOCK",
            StatefulError::NoTransaction(_) => "NO_TRANSACTION",
            StatefulError::AccountExists(_) => "ACCOUNT_EXISTS",
            StatefulError::DomainExists(_) => "DOMAIN_EXISTS",
            StatefulError::AssetExists(_) => "ASSET_EXISTS",
            StatefulError::RoleExists(_) => "ROLE_EXISTS",
            StatefulError::RoleAlreadyAppended { .. } => "ROLE_ALREADY_APPENDED",
            StatefulError::SignatoryExists { .. } => "SIGNATORY_EXISTS",
            StatefulError::NoSignatory { .. } => "NO_SIGNATORY",
            StatefulError::PermissionDenied { .. } => "PERMISSION_DENIED",
            StatefulError::NotSignatory { .. } => "NOT_SIGNATORY",
            StatefulError::InsufficientSignatures { .. } => "INSUFFICIENT_SIGNATURES",
            StatefulError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            StatefulError::PrecisionMismatch { .. } => "PRECISION_MISMATCH",
            StatefulError::BalanceOverflow(_) => "BALANCE_OVERFLOW",
            StatefulError::QuorumViolation { .. } => "QUORUM_VIOLATION",
            StatefulError::AlreadyCommitted(_) => "ALREADY_COMMITTED",
            StatefulError::DuplicateInProposal(_) => "DUPLICATE_IN_PROPOSAL",
        }
    }
}

/// Block could not be appended to the chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// Block height does not follow the chain head
    #[error("height mismatch: expected {expected}, got {actual}")]
    HeightMismatch {
        /// Head height + 1
        expected: u64,
        /// Block height
        actual: u64,
    },

    /// Block does not extend the chain head
    #[error("previous hash mismatch at height {height}: expected {expected}, got {actual}")]
    PreviousHashMismatch {
        /// Block height
        height: u64,
        /// Head hash
        expected: Hash,
        /// Block's previous hash
        actual: Hash,
    },

    /// Block body does not hash to the roots in its header
    #[error("body of block {height} does not match its header")]
    BodyMismatch {
        /// Block height
        height: u64,
    },

    /// Block carried no staged state and replaying it failed
    #[error("replay of block {height} failed at transaction {tx_hash}: {reason}")]
    Replay {
        /// Block height
        height: u64,
        /// Failing transaction
        tx_hash: Hash,
        /// Violation
        reason: StatefulError,
    },

    /// Block could not be persisted
    #[error("failed to persist block {height}: {reason}")]
    Storage {
        /// Block height
        height: u64,
        /// Back-end message
        reason: String,
    },
}

impl CommitError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::HeightMismatch { .. } => "HEIGHT_MISMATCH",
            CommitError::PreviousHashMismatch { .. } => "PREVIOUS_HASH_MISMATCH",
            CommitError::BodyMismatch { .. } => "BODY_MISMATCH",
            CommitError::Replay { .. } => "REPLAY_FAILED",
            CommitError::Storage { .. } => "STORAGE",
        }
    }
}
