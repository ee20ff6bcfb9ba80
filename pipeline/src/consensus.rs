//! Consensus agreement
//!
//! The voting protocol is outside the pipeline; it only needs a service that
//! turns a verified proposal into an agreed block or reports failure.

use crate::error::AgreementFailure;
use async_trait::async_trait;
use ledger_core::types::now_millis;
use ledger_core::{Block, ChainHead, KeyPair, VerifiedProposal};

/// Agreement service for one round
#[async_trait]
pub trait Agreement: Send + Sync + std::fmt::Debug {
    /// Agree on a block for `proposal` on top of `head`
    ///
    /// The block must carry exactly the proposal's accepted transactions (in
    /// order) and rejected hashes, at height `head.height + 1`.
    async fn agree(
        &self,
        proposal: &VerifiedProposal,
        head: &ChainHead,
    ) -> Result<Block, AgreementFailure>;
}

/// Single-peer agreement: the local peer signs every proposal it is given
#[derive(Debug, Clone)]
pub struct SoloAgreement {
    keypair: KeyPair,
}

impl SoloAgreement {
    /// Agree with `keypair` as the only peer
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl Agreement for SoloAgreement {
    async fn agree(
        &self,
        proposal: &VerifiedProposal,
        head: &ChainHead,
    ) -> Result<Block, AgreementFailure> {
        if proposal.height != head.height + 1 {
            return Err(AgreementFailure::Disagreement {
                height: proposal.height,
                reason: format!("proposal does not extend head at {}", head.height),
            });
        }

        let block = Block::from_verified(proposal, head.hash, now_millis()).sign(&self.keypair);
        Ok(block)
    }
}
