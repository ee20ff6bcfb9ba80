//! Transaction sequences: all-or-nothing batches

use crate::error::SequenceError;
use crate::stateless::StatelessValidator;
use ledger_core::{Hash, Transaction};
use std::collections::HashSet;

/// Ordered, deduplicated batch of stateless-valid transactions
///
/// Only [`TransactionSequence::build`] creates one, so holding a sequence
/// means every member passed validation together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSequence {
    transactions: Vec<Transaction>,
}

impl TransactionSequence {
    /// Validate `raw` as one unit
    ///
    /// Fails on an empty batch, a batch larger than `max_size`, the first
    /// member failing stateless validation, or a repeated transaction.
    pub fn build(
        raw: Vec<Transaction>,
        validator: &StatelessValidator,
        max_size: usize,
    ) -> Result<Self, SequenceError> {
        if raw.is_empty() {
            return Err(SequenceError::Empty);
        }
        if raw.len() > max_size {
            return Err(SequenceError::TooLarge {
                size: raw.len(),
                max: max_size,
            });
        }

        let mut seen: HashSet<Hash> = HashSet::with_capacity(raw.len());
        for (index, tx) in raw.iter().enumerate() {
            validator
                .validate(tx)
                .map_err(|source| SequenceError::InvalidMember { index, source })?;

            if !seen.insert(tx.hash()) {
                return Err(SequenceError::Duplicate {
                    index,
                    hash: tx.hash(),
                });
            }
        }

        Ok(Self { transactions: raw })
    }

    /// Members in order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Always false for a built sequence
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Member hashes in order
    pub fn hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    /// Take the members
    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::error::StatelessError;
    use ledger_core::{AccountId, Command, DomainId, Ed25519Verifier, KeyPair, RoleName};
    use std::sync::Arc;

    fn validator() -> StatelessValidator {
        StatelessValidator::new(ValidationConfig::default(), Arc::new(Ed25519Verifier))
    }

    fn create_domain_tx(keypair: &KeyPair, name: &str) -> Transaction {
        Transaction::builder(AccountId::new("admin@test"))
            .command(Command::CreateDomain {
                domain_id: DomainId::new(name),
                default_role: RoleName::new("user"),
            })
            .sign(keypair)
    }

    #[test]
    fn test_build_preserves_order() {
        let keypair = KeyPair::generate();
        let txs: Vec<Transaction> = (0..5)
            .map(|i| create_domain_tx(&keypair, &format!("domain{}", i)))
            .collect();
        let hashes: Vec<Hash> = txs.iter().map(Transaction::hash).collect();

        let sequence = TransactionSequence::build(txs, &validator(), 10).unwrap();
        assert_eq!(sequence.len(), 5);
        assert_eq!(sequence.hashes(), hashes);
    }

    #[test]
    fn test_one_invalid_member_rejects_all() {
        let keypair = KeyPair::generate();
        let mut txs: Vec<Transaction> = (0..3)
            .map(|i| create_domain_tx(&keypair, &format!("domain{}", i)))
            .collect();
        txs.insert(
            1,
            Transaction::builder(AccountId::new("admin@test"))
                .command(Command::CreateDomain {
                    domain_id: DomainId::new("unsigned"),
                    default_role: RoleName::new("user"),
                })
                .build(),
        );

        let err = TransactionSequence::build(txs, &validator(), 10).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::InvalidMember {
                index: 1,
                source: StatelessError::InsufficientSignatures { .. }
            }
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let keypair = KeyPair::generate();
        let tx = create_domain_tx(&keypair, "domain");
        let err = TransactionSequence::build(vec![tx.clone(), tx.clone()], &validator(), 10)
            .unwrap_err();

        assert_eq!(
            err,
            SequenceError::Duplicate {
                index: 1,
                hash: tx.hash()
            }
        );
    }

    #[test]
    fn test_size_bounds() {
        let keypair = KeyPair::generate();
        assert_eq!(
            TransactionSequence::build(vec![], &validator(), 10),
            Err(SequenceError::Empty)
        );

        let txs: Vec<Transaction> = (0..3)
            .map(|i| create_domain_tx(&keypair, &format!("domain{}", i)))
            .collect();
        assert_eq!(
            TransactionSequence::build(txs, &validator(), 2),
            Err(SequenceError::TooLarge { size: 3, max: 2 })
        );
    }
}
