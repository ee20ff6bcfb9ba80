//! Stateful validation of proposals

use ledger_core::state::{ExecutionMode, WorldState};
use ledger_core::{Proposal, RejectedTransaction, StateSnapshot, StatefulError, VerifiedProposal};
use std::collections::HashSet;

/// Validate `proposal` against `snapshot` in proposal order
///
/// Returns the partitioned proposal and the working state after every
/// accepted transaction. A rejected transaction leaves no trace in the
/// working state; later transactions see the state as it was before it.
/// The snapshot itself is never modified.
pub fn verify(proposal: &Proposal, snapshot: &StateSnapshot) -> (VerifiedProposal, WorldState) {
    let mut working = snapshot.world().clone();
    let mut accepted = Vec::with_capacity(proposal.transactions.len());
    let mut rejected = Vec::new();
    let mut seen = HashSet::with_capacity(proposal.transactions.len());

    for tx in &proposal.transactions {
        let hash = tx.hash();

        let outcome = if snapshot.is_committed(&hash) {
            Err((None, StatefulError::AlreadyCommitted(hash)))
        } else if !seen.insert(hash) {
            Err((None, StatefulError::DuplicateInProposal(hash)))
        } else {
            working
                .apply_transaction(tx, ExecutionMode::Checked)
                .map_err(|failure| (failure.command_index, failure.reason))
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(height = proposal.height, tx_hash = %hash, "Transaction accepted");
                accepted.push(tx.clone());
            }
            Err((command_index, reason)) => {
                tracing::warn!(
                    height = proposal.height,
                    tx_hash = %hash,
                    command_index = ?command_index,
                    reason = reason.code(),
                    "Transaction rejected: {}",
                    reason
                );
                rejected.push(RejectedTransaction {
                    hash,
                    command_index,
                    reason,
                });
            }
        }
    }

    let verified = VerifiedProposal {
        height: proposal.height,
        accepted,
        rejected,
    };
    (verified, working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::genesis::Genesis;
    use ledger_core::storage::MemoryBlockStorage;
    use ledger_core::{
        AccountId, Block, Command, DomainId, Hash, KeyPair, Ledger, RoleName, Transaction,
    };
    use std::sync::Arc;

    fn ledger(admin: &KeyPair) -> Ledger {
        let genesis = Genesis::new(admin.public_key()).block(admin);
        Ledger::open(Arc::new(MemoryBlockStorage::new()), &genesis).unwrap()
    }

    fn create_domain_tx(keypair: &KeyPair, name: &str) -> Transaction {
        Transaction::builder(Genesis::admin_account())
            .command(Command::CreateDomain {
                domain_id: DomainId::new(name),
                default_role: RoleName::new("user"),
            })
            .sign(keypair)
    }

    fn proposal(height: u64, transactions: Vec<Transaction>) -> Proposal {
        Proposal {
            height,
            transactions,
            created_at: 0,
        }
    }

    fn hashes(txs: &[Transaction]) -> Vec<Hash> {
        txs.iter().map(Transaction::hash).collect()
    }

    #[test]
    fn test_accepted_order_matches_proposal() {
        let admin = KeyPair::generate();
        let ledger = ledger(&admin);
        let txs: Vec<Transaction> = (0..5)
            .map(|i| create_domain_tx(&admin, &format!("domain{}", i)))
            .collect();

        let (verified, working) = verify(&proposal(2, txs.clone()), &ledger.snapshot());

        assert_eq!(hashes(&verified.accepted), hashes(&txs));
        assert!(verified.rejected.is_empty());
        assert!(working.domain(&DomainId::new("domain4")).is_some());
        // Committed state untouched
        assert!(ledger
            .snapshot()
            .world()
            .domain(&DomainId::new("domain4"))
            .is_none());
    }

    #[test]
    fn test_rejection_does_not_block_later_transactions() {
        let admin = KeyPair::generate();
        let ledger = ledger(&admin);

        let first = create_domain_tx(&admin, "shared");
        // Same domain again: different payload (later timestamp), same effect
        let clash = Transaction::builder(Genesis::admin_account())
            .created_at(first.payload().created_at + 1)
            .command(Command::CreateDomain {
                domain_id: DomainId::new("shared"),
                default_role: RoleName::new("user"),
            })
            .sign(&admin);
        let last = create_domain_tx(&admin, "other");

        let (verified, _) = verify(
            &proposal(2, vec![first.clone(), clash.clone(), last.clone()]),
            &ledger.snapshot(),
        );

        assert_eq!(hashes(&verified.accepted), vec![first.hash(), last.hash()]);
        assert_eq!(verified.rejected.len(), 1);
        assert_eq!(verified.rejected[0].hash, clash.hash());
        assert_eq!(verified.rejected[0].command_index, Some(0));
        assert_eq!(verified.rejected[0].reason.code(), "DOMAIN_EXISTS");
    }

    #[test]
    fn test_duplicate_and_committed_transactions_rejected() {
        let admin = KeyPair::generate();
        let ledger = ledger(&admin);
        let committed = create_domain_tx(&admin, "done");
        let block = Block::new(2, ledger.head().hash, vec![committed.clone()], vec![], 0);
        ledger.commit(&block, None).unwrap();

        let fresh = create_domain_tx(&admin, "fresh");
        let (verified, _) = verify(
            &proposal(3, vec![committed.clone(), fresh.clone(), fresh.clone()]),
            &ledger.snapshot(),
        );

        assert_eq!(hashes(&verified.accepted), vec![fresh.hash()]);
        assert_eq!(
            verified.rejected[0].reason,
            StatefulError::AlreadyCommitted(committed.hash())
        );
        assert_eq!(
            verified.rejected[1].reason,
            StatefulError::DuplicateInProposal(fresh.hash())
        );
    }

    #[test]
    fn test_unknown_creator_and_foreign_signer_rejected() {
        let admin = KeyPair::generate();
        let ledger = ledger(&admin);
        let stranger = KeyPair::generate();

        let ghost = Transaction::builder(AccountId::new("ghost@test"))
            .command(Command::CreateDomain {
                domain_id: DomainId::new("ghost"),
                default_role: RoleName::new("user"),
            })
            .sign(&stranger);
        let forged = create_domain_tx(&stranger, "forged");

        let (verified, working) =
            verify(&proposal(2, vec![ghost, forged]), &ledger.snapshot());

        assert!(verified.accepted.is_empty());
        assert_eq!(verified.rejected[0].reason.code(), "NO_ACCOUNT");
        assert_eq!(verified.rejected[1].reason.code(), "NOT_SIGNATORY");
        assert_eq!(&working, ledger.snapshot().world());
    }
}
