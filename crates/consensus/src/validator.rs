//! Whole-chain validity checks.

use crate::pow::ProofOfWork;
use peerchain_core::{Block, Blockchain, GENESIS_PREVIOUS_HASH};
use thiserror::Error;
use tracing::debug;

/// Why a chain failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("chain is empty")]
    EmptyChain,

    #[error("block {index} has no hash")]
    MissingHash { index: u64 },

    #[error("block {index} fails the proof-of-work check")]
    InvalidProof { index: u64 },

    #[error("block {index} does not link to its predecessor")]
    BrokenLink { index: u64 },
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Check one block against the hash expected for its parent.
pub fn validate_block(block: &Block, expected_previous: &str, pow: &ProofOfWork) -> Result<()> {
    let hash = block
        .hash
        .as_deref()
        .ok_or(ValidationError::MissingHash { index: block.index })?;
    if !pow.is_valid_proof(block, hash) {
        return Err(ValidationError::InvalidProof { index: block.index });
    }
    if block.previous_hash != expected_previous {
        return Err(ValidationError::BrokenLink { index: block.index });
    }
    Ok(())
}

/// Walk the chain from genesis and report the first failure.
pub fn validate_chain(blockchain: &Blockchain, pow: &ProofOfWork) -> Result<()> {
    if blockchain.is_empty() {
        return Err(ValidationError::EmptyChain);
    }
    let mut previous_hash = GENESIS_PREVIOUS_HASH;
    for block in &blockchain.chain {
        if let Err(e) = validate_block(block, previous_hash, pow) {
            debug!(length = blockchain.length(), "Chain rejected: {}", e);
            return Err(e);
        }
        previous_hash = block.hash_str();
    }
    Ok(())
}

/// True iff every block carries a valid proof and links to its predecessor.
pub fn check_chain_validity(blockchain: &Blockchain, pow: &ProofOfWork) -> bool {
    validate_chain(blockchain, pow).is_ok()
}
