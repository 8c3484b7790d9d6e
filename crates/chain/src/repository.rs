//! The canonical chain store.
//!
//! `ChainRepository` is the only writer of the local chain. Every mutation
//! and every read that feeds a compound decision goes through one mutex;
//! [`ChainRepository::lock`] hands out that mutex as a scoped
//! [`LockedChain`] guard so callers can read the tip and act on it
//! atomically.

use parking_lot::{Mutex, MutexGuard};
use peerchain_core::{Block, Blockchain};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when writing to the repository.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("previous hash mismatch (tip {expected:?}, got {got})")]
    PreviousHashMismatch {
        expected: Option<String>,
        got: String,
    },

    #[error("cannot seed a repository with an empty chain")]
    EmptyChain,
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// How a block would enter the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The block extends the tip.
    Append,
    /// The block wins a same-height race against the tip.
    Replace,
}

/// Decide how `block` enters `chain`, without mutating it.
///
/// A block replaces the tip when it sits at the tip's height, links to the
/// block below the tip, and carries an earlier timestamp. Otherwise it must
/// link to the tip itself.
pub fn admission(chain: &[Block], block: &Block) -> Result<Admission> {
    let Some(last) = chain.last() else {
        return Ok(Admission::Append);
    };
    let penultimate = chain.len().checked_sub(2).map(|i| &chain[i]);

    let races_tip = block.index == last.index
        && penultimate.is_some_and(|p| p.hash.as_deref() == Some(block.previous_hash.as_str()))
        && block.timestamp < last.timestamp;
    if races_tip {
        return Ok(Admission::Replace);
    }

    if last.hash.as_deref() != Some(block.previous_hash.as_str()) {
        return Err(RepositoryError::PreviousHashMismatch {
            expected: last.hash.clone(),
            got: block.previous_hash.clone(),
        });
    }
    Ok(Admission::Append)
}

/// Thread-safe store of the canonical chain.
#[derive(Debug)]
pub struct ChainRepository {
    chain: Mutex<Vec<Block>>,
}

/// Exclusive access to the chain for the lifetime of the guard.
pub struct LockedChain<'a> {
    guard: MutexGuard<'a, Vec<Block>>,
}

impl LockedChain<'_> {
    /// Owned copy of the chain as it is under the lock.
    pub fn snapshot(&self) -> Blockchain {
        Blockchain::new(self.guard.clone())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.guard
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.guard.last()
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }

    /// Swap in `blockchain` while the lock is still held.
    pub fn replace(&mut self, blockchain: Blockchain) {
        *self.guard = blockchain.chain;
    }
}

impl ChainRepository {
    /// Create a repository seeded with `genesis`.
    pub fn new(genesis: Block) -> Self {
        Self {
            chain: Mutex::new(vec![genesis]),
        }
    }

    /// Create a repository from an existing, non-empty chain.
    pub fn from_chain(blockchain: Blockchain) -> Result<Self> {
        if blockchain.is_empty() {
            return Err(RepositoryError::EmptyChain);
        }
        Ok(Self {
            chain: Mutex::new(blockchain.chain),
        })
    }

    /// Acquire the chain lock; it is released when the guard drops.
    pub fn lock(&self) -> LockedChain<'_> {
        LockedChain {
            guard: self.chain.lock(),
        }
    }

    /// Owned snapshot of the current chain.
    pub fn get_chain(&self) -> Blockchain {
        self.lock().snapshot()
    }

    /// Replace the whole chain.
    ///
    /// No validity or length check happens here; callers must verify the
    /// incoming chain first (see `ConsensusStrategy::reconcile`).
    pub fn set_chain(&self, blockchain: Blockchain) {
        let mut chain = self.chain.lock();
        *chain = blockchain.chain;
    }

    pub fn get_last_block(&self) -> Option<Block> {
        self.chain.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }

    /// How `block` would be admitted right now, without admitting it.
    pub fn check_admission(&self, block: &Block) -> Result<Admission> {
        admission(&self.chain.lock(), block)
    }

    /// Append `block`, or let it replace the tip when it wins a same-height
    /// race.
    pub fn add_or_replace(&self, block: Block) -> Result<Admission> {
        let mut chain = self.chain.lock();
        let outcome = admission(&chain, &block)?;
        match outcome {
            Admission::Replace => {
                debug!(index = block.index, "replacing tip with earlier block");
                if let Some(tip) = chain.last_mut() {
                    *tip = block;
                }
            }
            Admission::Append => chain.push(block),
        }
        Ok(outcome)
    }
}
