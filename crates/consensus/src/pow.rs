//! Proof-of-work puzzle.
//!
//! A block is proven when its hash, read as a big-endian bit string, starts
//! with at least `difficulty` zero bits. Mining searches nonces upward from 0.

use peerchain_core::{Block, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Default number of leading zero bits.
pub const DEFAULT_DIFFICULTY: u32 = 16;

/// Proof-of-work engine for a fixed difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: u32,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Self {
        Self { difficulty }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Search for the smallest nonce whose hash meets the difficulty.
    ///
    /// Resets `block.nonce` to 0 and mutates nothing else. Does not return
    /// until a proof is found.
    pub fn mine(&self, block: &mut Block) -> String {
        block.nonce = 0;
        loop {
            let digest = block.digest();
            if digest.meets_difficulty(self.difficulty) {
                return digest.to_hex();
            }
            block.nonce += 1;
        }
    }

    /// Like [`ProofOfWork::mine`], but gives up and returns `None` once
    /// `cancel` is set.
    pub fn mine_cancellable(&self, block: &mut Block, cancel: &AtomicBool) -> Option<String> {
        block.nonce = 0;
        loop {
            if cancel.load(Ordering::Relaxed) {
                debug!(index = block.index, nonce = block.nonce, "Mining cancelled");
                return None;
            }
            let digest = block.digest();
            if digest.meets_difficulty(self.difficulty) {
                return Some(digest.to_hex());
            }
            block.nonce += 1;
        }
    }

    /// True if the hex hash has the required leading zero bits.
    pub fn meets_difficulty(&self, hash: &str) -> bool {
        Hash::from_hex(hash)
            .map(|h| h.meets_difficulty(self.difficulty))
            .unwrap_or(false)
    }

    /// Accept `hash` iff it meets the difficulty and equals a fresh
    /// recomputation of `block`'s hash.
    pub fn is_valid_proof(&self, block: &Block, hash: &str) -> bool {
        self.meets_difficulty(hash) && hash == block.compute_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchain_core::Record;

    fn candidate() -> Block {
        Block::new(
            1,
            "0".repeat(64),
            vec![],
            1_700_000_000,
            vec![Record::with_timestamp(0, 1_700_000_000, "payload")],
        )
    }

    #[test]
    fn test_mine_finds_valid_proof() {
        let pow = ProofOfWork::new(8);
        let mut block = candidate();
        let proof = pow.mine(&mut block);

        assert!(pow.is_valid_proof(&block, &proof));
        assert_eq!(proof, block.compute_hash());
        assert!(Hash::from_hex(&proof).unwrap().leading_zero_bits() >= 8);
    }

    #[test]
    fn test_mine_finds_smallest_nonce() {
        let pow = ProofOfWork::new(6);
        let mut block = candidate();
        pow.mine(&mut block);

        let mut candidate_block = candidate();
        for nonce in 0..block.nonce {
            candidate_block.nonce = nonce;
            assert!(!pow.meets_difficulty(&candidate_block.compute_hash()));
        }
    }

    #[test]
    fn test_zero_difficulty_accepts_first_nonce() {
        let pow = ProofOfWork::new(0);
        let mut block = candidate();
        block.nonce = 41;
        let proof = pow.mine(&mut block);
        assert_eq!(block.nonce, 0);
        assert!(pow.is_valid_proof(&block, &proof));
    }

    #[test]
    fn test_forged_hash_with_valid_prefix_rejected() {
        let pow = ProofOfWork::new(8);
        let mut block = candidate();
        pow.mine(&mut block);

        let forged = format!("00{}", "f".repeat(62));
        assert!(pow.meets_difficulty(&forged));
        assert!(!pow.is_valid_proof(&block, &forged));
    }

    #[test]
    fn test_tampered_block_rejected() {
        let pow = ProofOfWork::new(8);
        let mut block = candidate();
        let proof = pow.mine(&mut block);

        block.records[0].content = "changed".into();
        assert!(!pow.is_valid_proof(&block, &proof));
    }

    #[test]
    fn test_garbage_hash_rejected() {
        let pow = ProofOfWork::new(0);
        assert!(!pow.is_valid_proof(&candidate(), "zz"));
        assert!(!pow.is_valid_proof(&candidate(), ""));
    }

    #[test]
    fn test_cancelled_mining_returns_none() {
        let pow = ProofOfWork::new(256);
        let cancel = AtomicBool::new(true);
        let mut block = candidate();
        assert_eq!(pow.mine_cancellable(&mut block, &cancel), None);
    }

    #[test]
    fn test_cancellable_mining_matches_plain_mining() {
        let pow = ProofOfWork::new(8);
        let cancel = AtomicBool::new(false);
        let mut a = candidate();
        let mut b = candidate();
        assert_eq!(pow.mine_cancellable(&mut a, &cancel), Some(pow.mine(&mut b)));
        assert_eq!(a.nonce, b.nonce);
    }
}
