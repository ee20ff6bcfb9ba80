//! Error types for the pipeline

use ledger_core::{AccountId, CommitError, Hash, PublicKey};
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Commit rejected
    #[error("Commit error: {0}")]
    Commit(#[from] CommitError),

    /// Task or channel failure
    #[error("Concurrency error: {0}")]
    Concurrency(String),

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

/// Transaction or query is malformed regardless of ledger state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatelessError {
    /// Created too long ago
    #[error("timestamp {created_at} is older than {max_age_ms} ms (now {now})")]
    StaleTimestamp {
        /// Creation time
        created_at: u64,
        /// Validator clock
        now: u64,
        /// Allowed age
        max_age_ms: u64,
    },

    /// Created in the future
    #[error("timestamp {created_at} is more than {max_skew_ms} ms ahead (now {now})")]
    FutureTimestamp {
        /// Creation time
        created_at: u64,
        /// Validator clock
        now: u64,
        /// Allowed skew
        max_skew_ms: u64,
    },

    /// Creator account id is not `name@domain`
    #[error("malformed creator account id {0}")]
    MalformedCreator(AccountId),

    /// Declared quorum out of range
    #[error("quorum {quorum} outside 1..={max}")]
    InvalidQuorum {
        /// Declared quorum
        quorum: u32,
        /// Upper bound
        max: u32,
    },

    /// Fewer signatures than the declared quorum
    #[error("{signatures} signatures for quorum {quorum}")]
    InsufficientSignatures {
        /// Declared quorum
        quorum: u32,
        /// Attached signatures
        signatures: usize,
    },

    /// A signature does not verify against the payload
    #[error("signature by {0} does not verify")]
    BadSignature(PublicKey),

    /// Query carries no signature
    #[error("query is not signed")]
    MissingSignature,

    /// Transaction has no commands
    #[error("transaction has no commands")]
    EmptyCommands,

    /// Transaction has too many commands
    #[error("{count} commands exceed the limit of {max}")]
    TooManyCommands {
        /// Commands present
        count: usize,
        /// Limit
        max: usize,
    },

    /// A command violates a structural constraint
    #[error("command {index} ({command}) is malformed: {reason}")]
    MalformedCommand {
        /// Position in the transaction
        index: usize,
        /// Command name
        command: &'static str,
        /// What is wrong
        reason: String,
    },

    /// Query payload violates a structural constraint
    #[error("query is malformed: {0}")]
    MalformedQuery(String),

    /// Query counter not above the last seen one
    #[error("query counter {counter} not above last seen {last_seen}")]
    StaleQueryCounter {
        /// Counter in the query
        counter: u64,
        /// Highest counter seen from the creator
        last_seen: u64,
    },
}

impl StatelessError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            StatelessError::StaleTimestamp { .. } => "STALE_TIMESTAMP",
            StatelessError::FutureTimestamp { .. } => "FUTURE_TIMESTAMP",
            StatelessError::MalformedCreator(_) => "MALFORMED_CREATOR",
            StatelessError::InvalidQuorum { .. } => "INVALID_QUORUM",
            StatelessError::InsufficientSignatures { .. } => "INSUFFICIENT_SIGNATURES",
            StatelessError::BadSignature(_) => "BAD_SIGNATURE",
            StatelessError::MissingSignature => "MISSING_SIGNATURE",
            StatelessError::EmptyCommands => "EMPTY_COMMANDS",
            StatelessError::TooManyCommands { .. } => "TOO_MANY_COMMANDS",
            StatelessError::MalformedCommand { .. } => "MALFORMED_COMMAND",
            StatelessError::MalformedQuery(_) => "MALFORMED_QUERY",
            StatelessError::StaleQueryCounter { .. } => "STALE_QUERY_COUNTER",
        }
    }
}

/// Batch cannot become a transaction sequence
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// No transactions
    #[error("sequence is empty")]
    Empty,

    /// More transactions than one proposal holds
    #[error("sequence of {size} exceeds proposal size {max}")]
    TooLarge {
        /// Batch size
        size: usize,
        /// Proposal capacity
        max: usize,
    },

    /// A member failed stateless validation
    #[error("transaction {index} is invalid: {source}")]
    InvalidMember {
        /// Position in the batch
        index: usize,
        /// Member's failure
        #[source]
        source: StatelessError,
    },

    /// Same transaction twice
    #[error("transaction {index} duplicates {hash}")]
    Duplicate {
        /// Position of the second occurrence
        index: usize,
        /// Shared identity
        hash: Hash,
    },
}

impl SequenceError {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            SequenceError::Empty => "EMPTY_SEQUENCE",
            SequenceError::TooLarge { .. } => "SEQUENCE_TOO_LARGE",
            SequenceError::InvalidMember { source, .. } => source.code(),
            SequenceError::Duplicate { .. } => "DUPLICATE_IN_SEQUENCE",
        }
    }

    /// Index of the offending member, if one is to blame
    pub fn member_index(&self) -> Option<usize> {
        match self {
            SequenceError::InvalidMember { index, .. } | SequenceError::Duplicate { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

/// Consensus did not produce a block for a round
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgreementFailure {
    /// Round did not finish in time
    #[error("agreement on height {height} timed out after {timeout_ms} ms")]
    Timeout {
        /// Round height
        height: u64,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Peers did not agree
    #[error("no agreement on height {height}: {reason}")]
    Disagreement {
        /// Round height
        height: u64,
        /// Agreement service message
        reason: String,
    },
}

impl AgreementFailure {
    /// Stable reason code
    pub fn code(&self) -> &'static str {
        match self {
            AgreementFailure::Timeout { .. } => "AGREEMENT_TIMEOUT",
            AgreementFailure::Disagreement { .. } => "DISAGREEMENT",
        }
    }
}

/// `await_block` gave up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AwaitError {
    /// No block with the transaction within the timeout
    #[error("transaction {0} not committed before timeout")]
    Timeout(Hash),

    /// Pipeline shut down
    #[error("block subscription closed")]
    Closed,
}
