//! Block commit
//!
//! The committer is the pipeline's only path into [`Ledger::commit`]. It
//! holds the world state computed by stateful validation for the proposal
//! under agreement, so an agreed block is applied without re-validation.

use ledger_core::state::WorldState;
use ledger_core::{Block, CommitError, Hash, Ledger, VerifiedProposal};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

/// Notified synchronously after every commit, in registration order
pub trait CommitObserver: Send + Sync {
    /// Called with the block just committed
    fn on_commit(&self, block: &Arc<Block>);
}

/// Working state staged for the block of one verified proposal
#[derive(Debug)]
struct Staged {
    height: u64,
    transactions_root: Hash,
    rejected_root: Hash,
    world: WorldState,
}

impl Staged {
    fn matches(&self, block: &Block) -> bool {
        self.height == block.height()
            && self.transactions_root == block.header.transactions_root
            && self.rejected_root == block.header.rejected_root
    }
}

/// Appends agreed blocks to the ledger and notifies observers
pub struct BlockCommitter {
    ledger: Arc<Ledger>,
    staged: Mutex<Option<Staged>>,
    observers: RwLock<Vec<Arc<dyn CommitObserver>>>,
}

impl fmt::Debug for BlockCommitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCommitter")
            .field("head", &self.ledger.head())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl BlockCommitter {
    /// Committer over `ledger`
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            staged: Mutex::new(None),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer; it sees every later commit
    pub fn register(&self, observer: Arc<dyn CommitObserver>) {
        self.observers.write().push(observer);
    }

    /// Stage the working state of `proposal`, replacing any earlier one
    pub fn stage(&self, proposal: &VerifiedProposal, world: WorldState) {
        *self.staged.lock() = Some(Staged {
            height: proposal.height,
            transactions_root: proposal.transactions_root(),
            rejected_root: proposal.rejected_root(),
            world,
        });
    }

    /// Drop the staged state (abandoned round)
    pub fn discard_staged(&self) {
        self.staged.lock().take();
    }

    /// Append `block`
    ///
    /// Uses the staged state when it was computed for exactly this block's
    /// contents; otherwise the ledger replays the block. Observers run only
    /// after the new head is visible.
    pub fn commit(&self, block: Block) -> Result<Arc<Block>, CommitError> {
        let staged = {
            let mut slot = self.staged.lock();
            match slot.take() {
                Some(staged) if staged.matches(&block) => Some(staged.world),
                Some(_) => {
                    tracing::debug!(
                        height = block.height(),
                        "Staged state does not match block, replaying"
                    );
                    None
                }
                None => None,
            }
        };

        self.ledger.commit(&block, staged)?;

        let block = Arc::new(block);
        tracing::info!(
            height = block.height(),
            block_hash = %block.hash(),
            transactions = block.transactions.len(),
            rejected = block.rejected_transactions.len(),
            "Block committed"
        );

        for observer in self.observers.read().iter() {
            observer.on_commit(&block);
        }

        Ok(block)
    }

    /// Ledger this committer appends to
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}
