//! Committed chain: head, world state and transaction index
//!
//! The ledger is the single writer of committed state. Readers take a
//! [`StateSnapshot`], which pins one head and one world state and never sees
//! a later commit.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{genesis::Genesis, storage::MemoryBlockStorage, KeyPair, Ledger};
//! use std::sync::Arc;
//!
//! # fn main() -> ledger_core::Result<()> {
//! let admin = KeyPair::generate();
//! let genesis = Genesis::new(admin.public_key()).block(&admin);
//! let ledger = Ledger::open(Arc::new(MemoryBlockStorage::new()), &genesis)?;
//!
//! assert_eq!(ledger.head().height, 1);
//! # Ok(())
//! # }
//! ```

use crate::{
    error::{CommitError, Error, Result},
    state::{ExecutionMode, WorldState},
    storage::BlockStorage,
    types::{Block, ChainHead, Hash, Transaction},
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug)]
struct Committed {
    head: ChainHead,
    world: Arc<WorldState>,
}

/// Append-only chain of committed blocks
#[derive(Debug)]
pub struct Ledger {
    committed: RwLock<Committed>,

    /// Transaction hash -> height of the block that accepted it
    tx_index: Arc<DashMap<Hash, u64>>,

    storage: Arc<dyn BlockStorage>,
}

impl Ledger {
    /// Open over `storage`
    ///
    /// An empty store gets `genesis` committed as block 1; otherwise the
    /// stored chain is replayed to rebuild world state.
    pub fn open(storage: Arc<dyn BlockStorage>, genesis: &Block) -> Result<Self> {
        let ledger = Self {
            committed: RwLock::new(Committed {
                head: ChainHead::empty(),
                world: Arc::new(WorldState::new()),
            }),
            tx_index: Arc::new(DashMap::new()),
            storage,
        };

        let latest = ledger.storage.latest_height()?;
        if latest == 0 {
            ledger.append(genesis, None, ExecutionMode::Genesis, true)?;
            tracing::info!(block_hash = %genesis.hash(), "Genesis block committed");
        } else {
            ledger.replay_stored(latest)?;
            if let Some(stored) = ledger.storage.block(1)? {
                if stored.hash() != genesis.hash() {
                    tracing::warn!(
                        stored = %stored.hash(),
                        configured = %genesis.hash(),
                        "Stored genesis differs from configured genesis, keeping stored chain"
                    );
                }
            }
        }

        Ok(ledger)
    }

    fn replay_stored(&self, latest: u64) -> Result<()> {
        for height in 1..=latest {
            let block = self
                .storage
                .block(height)?
                .ok_or(Error::BlockNotFound(height))?;
            let mode = if height == 1 {
                ExecutionMode::Genesis
            } else {
                ExecutionMode::Checked
            };
            self.append(&block, None, mode, false)?;
        }

        tracing::info!(height = latest, "Ledger replayed from storage");
        Ok(())
    }

    /// Current chain head
    pub fn head(&self) -> ChainHead {
        self.committed.read().head
    }

    /// Consistent view of committed state
    pub fn snapshot(&self) -> StateSnapshot {
        let committed = self.committed.read();
        StateSnapshot {
            head: committed.head,
            world: Arc::clone(&committed.world),
            tx_index: Arc::clone(&self.tx_index),
            storage: Arc::clone(&self.storage),
        }
    }

    /// Append an agreed block
    ///
    /// `staged` is the world state produced while validating exactly this
    /// block's transactions; without it the block is replayed on a copy of
    /// the current state. On error nothing changes.
    pub fn commit(
        &self,
        block: &Block,
        staged: Option<WorldState>,
    ) -> std::result::Result<(), CommitError> {
        self.append(block, staged, ExecutionMode::Checked, true)
    }

    fn append(
        &self,
        block: &Block,
        staged: Option<WorldState>,
        mode: ExecutionMode,
        persist: bool,
    ) -> std::result::Result<(), CommitError> {
        let mut committed = self.committed.write();
        let height = block.height();

        let expected = committed.head.height + 1;
        if height != expected {
            return Err(CommitError::HeightMismatch {
                expected,
                actual: height,
            });
        }
        if block.header.previous_hash != committed.head.hash {
            return Err(CommitError::PreviousHashMismatch {
                height,
                expected: committed.head.hash,
                actual: block.header.previous_hash,
            });
        }
        // Staged state is keyed by header roots, so the body must agree with them
        if !block.roots_match() {
            return Err(CommitError::BodyMismatch { height });
        }

        let mut world = match staged {
            Some(world) => world,
            None => replay(&committed.world, block, mode)?,
        };
        world.set_height(height);

        if persist {
            self.storage
                .persist_block(block)
                .map_err(|e| CommitError::Storage {
                    height,
                    reason: e.to_string(),
                })?;
        }

        for tx in &block.transactions {
            self.tx_index.insert(tx.hash(), height);
        }

        committed.head = ChainHead {
            height,
            hash: block.hash(),
        };
        committed.world = Arc::new(world);

        tracing::debug!(
            height,
            block_hash = %committed.head.hash,
            transactions = block.transactions.len(),
            rejected = block.rejected_transactions.len(),
            "Block appended"
        );

        Ok(())
    }

    /// Committed block at `height`
    pub fn block(&self, height: u64) -> Result<Option<Block>> {
        self.snapshot().block(height)
    }

    /// Height of the block that accepted `tx_hash`
    pub fn transaction_height(&self, tx_hash: &Hash) -> Option<u64> {
        self.tx_index.get(tx_hash).map(|entry| *entry)
    }
}

fn replay(
    base: &WorldState,
    block: &Block,
    mode: ExecutionMode,
) -> std::result::Result<WorldState, CommitError> {
    let mut world = base.clone();
    for tx in &block.transactions {
        world
            .apply_transaction(tx, mode)
            .map_err(|failure| CommitError::Replay {
                height: block.height(),
                tx_hash: tx.hash(),
                reason: failure.reason,
            })?;
    }
    Ok(world)
}

/// Read-only view of the ledger at one height
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    head: ChainHead,
    world: Arc<WorldState>,
    tx_index: Arc<DashMap<Hash, u64>>,
    storage: Arc<dyn BlockStorage>,
}

impl StateSnapshot {
    /// Head this snapshot was taken at
    pub fn head(&self) -> ChainHead {
        self.head
    }

    /// World state at the head
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Height of the block that accepted `tx_hash`, if at or below the head
    pub fn transaction_height(&self, tx_hash: &Hash) -> Option<u64> {
        self.tx_index
            .get(tx_hash)
            .map(|entry| *entry)
            .filter(|height| *height <= self.head.height)
    }

    /// Whether `tx_hash` is committed as of this snapshot
    pub fn is_committed(&self, tx_hash: &Hash) -> bool {
        self.transaction_height(tx_hash).is_some()
    }

    /// Committed block at `height`, if at or below the head
    pub fn block(&self, height: u64) -> Result<Option<Block>> {
        if height == 0 || height > self.head.height {
            return Ok(None);
        }
        self.storage.block(height)
    }

    /// Committed transaction by hash
    pub fn transaction(&self, tx_hash: &Hash) -> Result<Option<Transaction>> {
        let height = match self.transaction_height(tx_hash) {
            Some(height) => height,
            None => return Ok(None),
        };
        let block = self.block(height)?.ok_or(Error::BlockNotFound(height))?;
        Ok(block
            .transactions
            .into_iter()
            .find(|tx| tx.hash() == *tx_hash))
    }
}
