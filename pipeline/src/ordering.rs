//! Ordering service: pending pool and proposal assembly
//!
//! Producers push through cloned [`OrderingGate`]s onto a lock-free queue;
//! the round driver owns the single [`OrderingService`] consumer. A batch
//! (one transaction, or a whole sequence) is the queue unit and is never split
//! across proposals.

use crate::sequence::TransactionSequence;
use crossbeam::queue::SegQueue;
use ledger_core::types::now_millis;
use ledger_core::{Proposal, Transaction};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
struct Pool {
    queue: SegQueue<Vec<Transaction>>,

    /// Transactions in `queue` plus the consumer's carry-over
    pending: AtomicUsize,

    /// Pending count that triggers a round early
    threshold: usize,

    ready: Notify,
}

/// Producer handle onto the pending pool
#[derive(Debug, Clone)]
pub struct OrderingGate {
    pool: Arc<Pool>,
}

impl OrderingGate {
    /// Queue one stateless-valid transaction
    pub fn push(&self, tx: Transaction) {
        self.push_batch(vec![tx]);
    }

    /// Queue a sequence as one unit
    pub fn push_sequence(&self, sequence: TransactionSequence) {
        self.push_batch(sequence.into_transactions());
    }

    fn push_batch(&self, batch: Vec<Transaction>) {
        if batch.is_empty() {
            return;
        }
        let added = batch.len();
        self.pool.queue.push(batch);
        let pending = self.pool.pending.fetch_add(added, Ordering::AcqRel) + added;

        if pending >= self.pool.threshold {
            self.pool.ready.notify_one();
        }
    }

    /// Transactions waiting for a proposal
    pub fn pending(&self) -> usize {
        self.pool.pending.load(Ordering::Acquire)
    }

    /// Resolves once the pending count reaches the size threshold
    pub async fn ready(&self) {
        self.pool.ready.notified().await
    }
}

/// Consumer side: drains the pool into proposals
#[derive(Debug)]
pub struct OrderingService {
    pool: Arc<Pool>,

    /// Batches returned by abandoned rounds, drawn before the queue
    carry_over: VecDeque<Vec<Transaction>>,

    max_proposal_size: usize,
}

impl OrderingService {
    /// Create the pool, returning its producer gate and its consumer
    pub fn new(max_proposal_size: usize) -> (OrderingGate, OrderingService) {
        let max_proposal_size = max_proposal_size.max(1);
        let pool = Arc::new(Pool {
            queue: SegQueue::new(),
            pending: AtomicUsize::new(0),
            threshold: max_proposal_size,
            ready: Notify::new(),
        });

        let gate = OrderingGate {
            pool: Arc::clone(&pool),
        };
        let service = OrderingService {
            pool,
            carry_over: VecDeque::new(),
            max_proposal_size,
        };
        (gate, service)
    }

    /// Transactions waiting for a proposal
    pub fn pending(&self) -> usize {
        self.pool.pending.load(Ordering::Acquire)
    }

    /// Proposal capacity
    pub fn max_proposal_size(&self) -> usize {
        self.max_proposal_size
    }

    fn next_batch(&mut self) -> Option<Vec<Transaction>> {
        self.carry_over.pop_front().or_else(|| self.pool.queue.pop())
    }

    /// Drain up to `max_proposal_size` transactions in arrival order
    ///
    /// Returns `None` when the pool is empty. A batch that does not fit is
    /// kept for the next round, unless the proposal would otherwise be empty.
    pub fn next_proposal(&mut self, height: u64) -> Option<Proposal> {
        let mut transactions: Vec<Transaction> = Vec::new();

        while let Some(batch) = self.next_batch() {
            if !transactions.is_empty() && transactions.len() + batch.len() > self.max_proposal_size
            {
                self.carry_over.push_front(batch);
                break;
            }
            transactions.extend(batch);
            if transactions.len() >= self.max_proposal_size {
                break;
            }
        }

        if transactions.is_empty() {
            return None;
        }

        self.pool
            .pending
            .fetch_sub(transactions.len(), Ordering::AcqRel);

        tracing::debug!(
            height,
            transactions = transactions.len(),
            pending = self.pending(),
            "Proposal drawn"
        );

        Some(Proposal {
            height,
            transactions,
            created_at: now_millis(),
        })
    }

    /// Return an abandoned round's transactions to the front of the pool
    pub fn requeue_front(&mut self, transactions: Vec<Transaction>) {
        if transactions.is_empty() {
            return;
        }
        let count = transactions.len();
        self.carry_over.push_front(transactions);
        self.pool.pending.fetch_add(count, Ordering::AcqRel);

        tracing::debug!(requeued = count, "Transactions returned to pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{AccountId, Command, DomainId, Hash, KeyPair, RoleName};

    fn tx(keypair: &KeyPair, name: &str) -> Transaction {
        Transaction::builder(AccountId::new("admin@test"))
            .command(Command::CreateDomain {
                domain_id: DomainId::new(name),
                default_role: RoleName::new("user"),
            })
            .sign(keypair)
    }

    fn hashes(txs: &[Transaction]) -> Vec<Hash> {
        txs.iter().map(Transaction::hash).collect()
    }

    #[test]
    fn test_empty_pool_yields_no_proposal() {
        let (_gate, mut service) = OrderingService::new(10);
        assert!(service.next_proposal(2).is_none());
    }

    #[test]
    fn test_drains_in_arrival_order_up_to_capacity() {
        let keypair = KeyPair::generate();
        let (gate, mut service) = OrderingService::new(3);
        let txs: Vec<Transaction> = (0..5).map(|i| tx(&keypair, &format!("d{}", i))).collect();
        for t in &txs {
            gate.push(t.clone());
        }
        assert_eq!(gate.pending(), 5);

        let first = service.next_proposal(2).unwrap();
        assert_eq!(first.height, 2);
        assert_eq!(hashes(&first.transactions), hashes(&txs[..3]));

        let second = service.next_proposal(3).unwrap();
        assert_eq!(hashes(&second.transactions), hashes(&txs[3..]));
        assert_eq!(service.pending(), 0);
    }

    #[test]
    fn test_batch_never_split() {
        let keypair = KeyPair::generate();
        let (gate, mut service) = OrderingService::new(4);

        gate.push(tx(&keypair, "single"));
        gate.push_batch((0..4).map(|i| tx(&keypair, &format!("b{}", i))).collect());

        let first = service.next_proposal(2).unwrap();
        assert_eq!(first.transactions.len(), 1);

        let second = service.next_proposal(3).unwrap();
        assert_eq!(second.transactions.len(), 4);
    }

    #[test]
    fn test_requeued_transactions_come_first() {
        let keypair = KeyPair::generate();
        let (gate, mut service) = OrderingService::new(10);

        gate.push(tx(&keypair, "first"));
        let abandoned = service.next_proposal(2).unwrap();

        gate.push(tx(&keypair, "second"));
        service.requeue_front(abandoned.transactions.clone());
        assert_eq!(service.pending(), 2);

        let retried = service.next_proposal(2).unwrap();
        assert_eq!(retried.transactions[0], abandoned.transactions[0]);
        assert_eq!(retried.transactions.len(), 2);
    }

    #[tokio::test]
    async fn test_threshold_wakes_consumer() {
        let keypair = KeyPair::generate();
        let (gate, _service) = OrderingService::new(2);

        gate.push(tx(&keypair, "a"));
        gate.push(tx(&keypair, "b"));

        // Permit stored by the second push
        tokio::time::timeout(std::time::Duration::from_secs(1), gate.ready())
            .await
            .unwrap();
    }
}
