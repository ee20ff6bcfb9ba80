//! Responses returned to clients for transactions and queries

use crate::error::{SequenceError, StatelessError};
use ledger_core::{Hash, QueryResult, StatefulError};
use std::fmt;

/// Why an item failed: stable code plus human-readable detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reason {
    /// Stable reason code (e.g. `NO_ACCOUNT`)
    pub code: &'static str,

    /// Detail message
    pub message: String,
}

impl Reason {
    /// Create a reason
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<&StatelessError> for Reason {
    fn from(err: &StatelessError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<&StatefulError> for Reason {
    fn from(err: &StatefulError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<&SequenceError> for Reason {
    fn from(err: &SequenceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Outcome of a pipeline stage for one transaction or query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Transaction passed stateless validation and was queued
    StatelessValid {
        /// Transaction identity
        tx_hash: Hash,
    },

    /// Transaction or query failed stateless validation
    StatelessFailed {
        /// Transaction or query identity
        hash: Hash,
        /// Failure
        reason: Reason,
    },

    /// Transaction or query violated ledger state
    StatefulFailed {
        /// Transaction or query identity
        hash: Hash,
        /// Failure
        reason: Reason,
    },

    /// Transaction is in a committed block
    Committed {
        /// Transaction identity
        tx_hash: Hash,
        /// Block height
        height: u64,
    },

    /// Query answered
    QueryResult {
        /// Query identity
        query_hash: Hash,
        /// Answer
        result: QueryResult,
    },
}

impl Response {
    /// Identity of the transaction or query this responds to
    pub fn hash(&self) -> Hash {
        match self {
            Response::StatelessValid { tx_hash } | Response::Committed { tx_hash, .. } => *tx_hash,
            Response::StatelessFailed { hash, .. } | Response::StatefulFailed { hash, .. } => *hash,
            Response::QueryResult { query_hash, .. } => *query_hash,
        }
    }

    /// Failure reason, if this is a failure
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Response::StatelessFailed { reason, .. } | Response::StatefulFailed { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }

    /// Whether this is a failure
    pub fn is_failure(&self) -> bool {
        self.reason().is_some()
    }

    /// Tag name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Response::StatelessValid { .. } => "StatelessValid",
            Response::StatelessFailed { .. } => "StatelessFailed",
            Response::StatefulFailed { .. } => "StatefulFailed",
            Response::Committed { .. } => "Committed",
            Response::QueryResult { .. } => "QueryResult",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_specific_code() {
        let hash = Hash::new([1u8; 32]);
        let response = Response::StatelessFailed {
            hash,
            reason: Reason::from(&StatelessError::EmptyCommands),
        };

        assert!(response.is_failure());
        assert_eq!(response.hash(), hash);
        assert_eq!(response.reason().map(|r| r.code), Some("EMPTY_COMMANDS"));
        assert_eq!(response.kind(), "StatelessFailed");
    }

    #[test]
    fn test_success_has_no_reason() {
        let response = Response::Committed {
            tx_hash: Hash::new([2u8; 32]),
            height: 4,
        };
        assert!(!response.is_failure());
        assert!(response.reason().is_none());
    }
}
