//! Round event subscriptions
//!
//! Each round publishes its proposal, verified proposal and, once committed,
//! its block on tokio broadcast channels. A slow subscriber lags and misses
//! events rather than holding up the round.
//!
//! Excluded transactions are indexed for the last `excluded_retention`
//! blocks only; older exclusions are no longer resolved by `await_block`.

use crate::commit::CommitObserver;
use crate::error::AwaitError;
use dashmap::DashMap;
use ledger_core::{Block, Hash, Ledger, Proposal, VerifiedProposal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

/// Broadcast hub for round events
#[derive(Debug)]
pub struct Observers {
    proposals: broadcast::Sender<Arc<Proposal>>,
    verified: broadcast::Sender<Arc<VerifiedProposal>>,
    blocks: broadcast::Sender<Arc<Block>>,

    /// Excluded transaction -> height of the block that listed it
    excluded: DashMap<Hash, u64>,

    /// Blocks an exclusion stays indexed for
    excluded_retention: u64,
}

impl Observers {
    /// Hub with `capacity` buffered events per channel, indexing exclusions
    /// of the last `excluded_retention` blocks
    pub fn new(capacity: usize, excluded_retention: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            proposals: broadcast::channel(capacity).0,
            verified: broadcast::channel(capacity).0,
            blocks: broadcast::channel(capacity).0,
            excluded: DashMap::new(),
            excluded_retention: excluded_retention.max(1),
        }
    }

    /// Exclusions currently indexed
    pub fn excluded_len(&self) -> usize {
        self.excluded.len()
    }

    /// Subscribe to proposals
    pub fn on_proposal(&self) -> broadcast::Receiver<Arc<Proposal>> {
        self.proposals.subscribe()
    }

    /// Subscribe to verified proposals
    pub fn on_verified_proposal(&self) -> broadcast::Receiver<Arc<VerifiedProposal>> {
        self.verified.subscribe()
    }

    /// Subscribe to committed blocks
    pub fn on_block(&self) -> broadcast::Receiver<Arc<Block>> {
        self.blocks.subscribe()
    }

    pub(crate) fn publish_proposal(&self, proposal: Arc<Proposal>) {
        // No subscribers is not an error
        let _ = self.proposals.send(proposal);
    }

    pub(crate) fn publish_verified(&self, verified: Arc<VerifiedProposal>) {
        let _ = self.verified.send(verified);
    }

    /// Block that accepted or excluded `tx_hash`, if already committed
    fn settled_block(&self, ledger: &Ledger, tx_hash: &Hash) -> Option<Arc<Block>> {
        let height = ledger
            .transaction_height(tx_hash)
            .or_else(|| self.excluded.get(tx_hash).map(|entry| *entry))?;

        match ledger.block(height) {
            Ok(block) => block.map(Arc::new),
            Err(e) => {
                tracing::warn!(height, error = %e, "Failed to load committed block");
                None
            }
        }
    }

    /// Wait until a block accepting or excluding `tx_hash` is committed
    pub async fn await_block(
        &self,
        ledger: &Ledger,
        tx_hash: Hash,
        timeout: Duration,
    ) -> Result<Arc<Block>, AwaitError> {
        let deadline = Instant::now() + timeout;

        // Subscribe before checking the ledger so no commit slips between
        let mut blocks = self.blocks.subscribe();
        if let Some(block) = self.settled_block(ledger, &tx_hash) {
            return Ok(block);
        }

        loop {
            match tokio::time::timeout_at(deadline, blocks.recv()).await {
                Err(_) => return Err(AwaitError::Timeout(tx_hash)),
                Ok(Ok(block)) => {
                    if block.contains_transaction(&tx_hash) || block.rejects_transaction(&tx_hash) {
                        return Ok(block);
                    }
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "Block subscription lagged, checking ledger");
                    if let Some(block) = self.settled_block(ledger, &tx_hash) {
                        return Ok(block);
                    }
                }
                Ok(Err(RecvError::Closed)) => return Err(AwaitError::Closed),
            }
        }
    }
}

impl CommitObserver for Observers {
    fn on_commit(&self, block: &Arc<Block>) {
        let height = block.height();
        if height > self.excluded_retention {
            let oldest = height - self.excluded_retention;
            self.excluded.retain(|_, listed| *listed > oldest);
        }
        for hash in &block.rejected_transactions {
            self.excluded.insert(*hash, height);
        }
        let _ = self.blocks.send(Arc::clone(block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::genesis::Genesis;
    use ledger_core::storage::MemoryBlockStorage;
    use ledger_core::KeyPair;

    fn ledger() -> Arc<Ledger> {
        let admin = KeyPair::generate();
        let genesis = Genesis::new(admin.public_key()).block(&admin);
        Arc::new(Ledger::open(Arc::new(MemoryBlockStorage::new()), &genesis).unwrap())
    }

    #[tokio::test]
    async fn test_await_block_times_out() {
        let observers = Observers::new(8, 100);
        let ledger = ledger();

        let result = observers
            .await_block(&ledger, Hash::new([7u8; 32]), Duration::from_millis(20))
            .await;
        assert_eq!(result.unwrap_err(), AwaitError::Timeout(Hash::new([7u8; 32])));
    }

    #[tokio::test]
    async fn test_await_block_sees_excluded_transaction() {
        let observers = Arc::new(Observers::new(8, 100));
        let ledger = ledger();
        let excluded = Hash::new([9u8; 32]);

        let block = Block::new(2, ledger.head().hash, vec![], vec![excluded], 0);
        ledger.commit(&block, None).unwrap();
        observers.on_commit(&Arc::new(block.clone()));

        // Already committed: answered from the ledger
        let found = observers
            .await_block(&ledger, excluded, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(found.hash(), block.hash());
    }

    #[tokio::test]
    async fn test_await_block_wakes_on_commit() {
        let observers = Arc::new(Observers::new(8, 100));
        let ledger = ledger();
        let excluded = Hash::new([3u8; 32]);

        let waiter = {
            let observers = observers.clone();
            let ledger = ledger.clone();
            tokio::spawn(async move {
                observers
                    .await_block(&ledger, excluded, Duration::from_secs(5))
                    .await
            })
        };
        tokio::task::yield_now().await;

        let block = Block::new(2, ledger.head().hash, vec![], vec![excluded], 0);
        ledger.commit(&block, None).unwrap();
        observers.on_commit(&Arc::new(block.clone()));

        let found = waiter.await.unwrap().unwrap();
        assert_eq!(found.height(), 2);
    }

    #[test]
    fn test_exclusions_pruned_after_retention() {
        let observers = Observers::new(8, 2);
        let old = Hash::new([1u8; 32]);
        let recent = Hash::new([2u8; 32]);

        observers.on_commit(&Arc::new(Block::new(2, Hash::ZERO, vec![], vec![old], 0)));
        observers.on_commit(&Arc::new(Block::new(3, Hash::ZERO, vec![], vec![recent], 0)));
        assert_eq!(observers.excluded_len(), 2);

        observers.on_commit(&Arc::new(Block::new(4, Hash::ZERO, vec![], vec![], 0)));
        assert_eq!(observers.excluded_len(), 1);
        assert!(observers.excluded.get(&old).is_none());
        assert_eq!(observers.excluded.get(&recent).map(|h| *h), Some(3));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let observers = Observers::new(1, 100);
        observers.publish_proposal(Arc::new(Proposal {
            height: 2,
            transactions: vec![],
            created_at: 0,
        }));
        let mut rx = observers.on_proposal();
        assert!(rx.try_recv().is_err());
    }
}
