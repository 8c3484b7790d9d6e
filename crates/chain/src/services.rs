//! Chain services: enqueueing, mining, minting, accepting blocks and
//! reconciling with peers.
//!
//! These functions are the operations handlers call into; they take the
//! repositories they work on explicitly.

use crate::pending::PendingBlockQueue;
use crate::repository::{Admission, ChainRepository, RepositoryError};
use peerchain_consensus::{validate_chain, ProofOfWork, ValidationError};
use peerchain_core::{current_timestamp, Block, Blockchain, CryptoError, PendingBlock};
use rand::seq::SliceRandom;
use std::sync::atomic::AtomicBool;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("invalid proof for block {index}")]
    InvalidProof { index: u64 },

    #[error("invalid blockchain: {0}")]
    InvalidBlockchain(#[from] ValidationError),

    #[error("invalid seal on block {index}: {reason}")]
    InvalidSeal { index: u64, reason: String },

    #[error("block {index} lacks quorum: {accepts} of {participants} participants endorsed it")]
    NoQuorum {
        index: u64,
        accepts: usize,
        participants: usize,
    },

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl ChainError {
    /// True if the block did not extend the local tip.
    pub fn is_previous_hash_mismatch(&self) -> bool {
        matches!(
            self,
            ChainError::Repository(RepositoryError::PreviousHashMismatch { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Enqueue `pending`, assigning its index from the current tip and queue
/// length.
///
/// The tip read and the enqueue happen under the chain lock, so concurrent
/// producers receive consecutive indices.
pub fn add_pending_block(
    queue: &PendingBlockQueue,
    repo: &ChainRepository,
    mut pending: PendingBlock,
) -> u64 {
    let locked = repo.lock();
    let tip_index = locked.last_block().map(|b| b.index).unwrap_or(0);
    pending.index = tip_index + queue.pending_blocks_count() as u64 + 1;
    let index = pending.index;
    queue.add(pending);
    drop(locked);

    info!(index, "New pending block added");
    index
}

/// Pick side links from `chain`: every block except the tip if there are at
/// most `n` of them, otherwise a random sample of `n`.
pub fn get_side_links(n: usize, chain: &[Block]) -> Vec<String> {
    let candidates = match chain.split_last() {
        Some((_, rest)) => rest,
        None => return Vec::new(),
    };
    if candidates.len() <= n {
        return candidates.iter().map(|b| b.hash_str().to_string()).collect();
    }
    candidates
        .choose_multiple(&mut rand::thread_rng(), n)
        .map(|b| b.hash_str().to_string())
        .collect()
}

/// Build an unhashed block from `pending` on top of the current tip.
pub fn build_candidate(repo: &ChainRepository, pending: PendingBlock, side_links: usize) -> Block {
    let locked = repo.lock();
    let previous_hash = locked
        .last_block()
        .map(|b| b.hash_str().to_string())
        .unwrap_or_default();
    let links = get_side_links(side_links, locked.blocks());
    drop(locked);

    Block::new(
        pending.index,
        previous_hash,
        links,
        current_timestamp(),
        pending.records,
    )
}

/// Mine `pending` into a proven block, or `None` if `cancel` is raised first.
pub fn mine_pending(
    repo: &ChainRepository,
    pending: PendingBlock,
    pow: &ProofOfWork,
    side_links: usize,
    cancel: &AtomicBool,
) -> Option<Block> {
    let mut block = build_candidate(repo, pending, side_links);
    info!(index = block.index, difficulty = pow.difficulty(), "Mining block");
    let proof = pow.mine_cancellable(&mut block, cancel)?;
    block.hash = Some(proof);
    Some(block)
}

/// Pop the oldest pending block and mine it.
///
/// Returns the mined block without submitting it; `None` if the queue is
/// empty.
pub fn mine_block(
    queue: &PendingBlockQueue,
    repo: &ChainRepository,
    pow: &ProofOfWork,
    side_links: usize,
) -> Option<Block> {
    let pending = queue.pop()?;
    let never = AtomicBool::new(false);
    mine_pending(repo, pending, pow, side_links, &never)
}

/// Validate `proof` for `block` and add it to the chain.
pub fn add_block(
    repo: &ChainRepository,
    mut block: Block,
    proof: &str,
    pow: &ProofOfWork,
) -> Result<Admission> {
    if !pow.is_valid_proof(&block, proof) {
        return Err(ChainError::InvalidProof { index: block.index });
    }
    block.hash = Some(proof.to_string());
    let index = block.index;
    let admission = repo.add_or_replace(block)?;
    info!(index, ?admission, "Block added to the chain");
    Ok(admission)
}

/// Hash `pending` into a block without any puzzle.
pub fn mint_pending(repo: &ChainRepository, pending: PendingBlock, side_links: usize) -> Block {
    let mut block = build_candidate(repo, pending, side_links);
    block.hash = Some(block.compute_hash());
    block
}

/// Pop the oldest pending block and mint it; `None` on an empty queue.
pub fn mint_block(
    queue: &PendingBlockQueue,
    repo: &ChainRepository,
    side_links: usize,
) -> Option<Block> {
    let pending = queue.pop()?;
    let block = mint_pending(repo, pending, side_links);
    debug!(index = block.index, "Minted block");
    Some(block)
}

/// Append or replace with `block` on behalf of `forger_address`.
///
/// Returns whether the repository took the block; quorum checks belong to
/// the caller.
pub fn add_block_v2(repo: &ChainRepository, block: Block, forger_address: &str) -> bool {
    let index = block.index;
    match repo.add_or_replace(block) {
        Ok(admission) => {
            debug!(index, forger = forger_address, ?admission, "Block accepted");
            true
        }
        Err(e) => {
            warn!(index, forger = forger_address, "Block rejected: {}", e);
            false
        }
    }
}

/// Replace the local chain with `blockchain` if it is valid.
///
/// Does not compare lengths; use [`reconcile_chain`] for peer chains.
pub fn set_chain(blockchain: Blockchain, repo: &ChainRepository, pow: &ProofOfWork) -> Result<()> {
    validate_chain(&blockchain, pow)?;
    let length = blockchain.length();
    repo.set_chain(blockchain);
    info!(length, "Chain updated");
    Ok(())
}

/// Adopt `peer` iff it is strictly longer than the local chain and valid.
///
/// Returns whether the local chain was replaced.
pub fn reconcile_chain(peer: Blockchain, repo: &ChainRepository, pow: &ProofOfWork) -> Result<bool> {
    let local = repo.len();
    if peer.length() <= local {
        debug!(peer = peer.length(), local, "Keeping local chain");
        return Ok(false);
    }
    validate_chain(&peer, pow)?;
    Ok(adopt_longer(peer, repo))
}

/// Install an already validated `peer` if it is still strictly longer.
///
/// The length comparison and the swap happen under one lock, so a block
/// appended after validation is never silently discarded.
pub fn adopt_longer(peer: Blockchain, repo: &ChainRepository) -> bool {
    let mut locked = repo.lock();
    let local = locked.len();
    let length = peer.length();
    if length <= local {
        debug!(peer = length, local, "Local chain grew meanwhile, keeping it");
        return false;
    }
    locked.replace(peer);
    drop(locked);
    info!(length, "Chain updated");
    true
}

/// Snapshot of the local chain.
pub fn show_chain(repo: &ChainRepository) -> Blockchain {
    repo.get_chain()
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchain_consensus::check_chain_validity;
    use peerchain_core::Record;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    const DIFFICULTY: u32 = 8;

    fn seeded(pow: &ProofOfWork) -> ChainRepository {
        let mut genesis = Block::genesis(0);
        genesis.hash = Some(pow.mine(&mut genesis));
        ChainRepository::new(genesis)
    }

    fn pending_with(content: &str) -> PendingBlock {
        PendingBlock::new(vec![Record::new(0, content)])
    }

    #[test]
    fn test_add_pending_block_reindexes() {
        let pow = ProofOfWork::new(0);
        let repo = seeded(&pow);
        let queue = PendingBlockQueue::new();

        let mut pending = pending_with("a");
        pending.index = 99;
        assert_eq!(add_pending_block(&queue, &repo, pending), 1);
        assert_eq!(add_pending_block(&queue, &repo, pending_with("b")), 2);
        assert_eq!(queue.pop().unwrap().index, 1);
    }

    #[test]
    fn test_add_pending_block_concurrent_indices_unique() {
        let pow = ProofOfWork::new(0);
        let repo = Arc::new(seeded(&pow));
        let queue = Arc::new(PendingBlockQueue::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = Arc::clone(&repo);
                let queue = Arc::clone(&queue);
                thread::spawn(move || add_pending_block(&queue, &repo, pending_with(&i.to_string())))
            })
            .collect();
        let indices: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(indices, (1..=16).collect());
        let popped: Vec<u64> = std::iter::from_fn(|| queue.pop().map(|b| b.index)).collect();
        assert_eq!(popped, (1..=16).collect::<Vec<_>>());
    }

    #[test]
    fn test_side_links_exclude_tip() {
        let blocks: Vec<Block> = (0..3).map(Block::genesis).collect();
        let links = get_side_links(2, &blocks);
        assert_eq!(links, vec![blocks[0].hash_str(), blocks[1].hash_str()]);
        assert!(get_side_links(2, &blocks[..1]).is_empty());
        assert!(get_side_links(2, &[]).is_empty());
    }

    #[test]
    fn test_side_links_sample_when_many() {
        let blocks: Vec<Block> = (0..10).map(Block::genesis).collect();
        let links = get_side_links(2, &blocks);
        assert_eq!(links.len(), 2);
        let tip = blocks[9].hash_str().to_string();
        assert!(!links.contains(&tip));
        assert_ne!(links[0], links[1]);
    }

    #[test]
    fn test_mine_block() {
        let pow = ProofOfWork::new(DIFFICULTY);
        let repo = seeded(&pow);
        let queue = PendingBlockQueue::new();
        add_pending_block(&queue, &repo, pending_with("First transaction"));
        add_pending_block(&queue, &repo, pending_with("Second transaction"));

        let block = mine_block(&queue, &repo, &pow, 2).unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.records[0].content, "First transaction");
        assert_eq!(queue.pending_blocks_count(), 1);
        add_block(&repo, block.clone(), block.hash_str(), &pow).unwrap();

        let block = mine_block(&queue, &repo, &pow, 2).unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.records[0].content, "Second transaction");
        assert_eq!(queue.pending_blocks_count(), 0);
        assert!(mine_block(&queue, &repo, &pow, 2).is_none());
    }

    #[test]
    fn test_add_block_rejects_bad_proof() {
        let pow = ProofOfWork::new(DIFFICULTY);
        let repo = seeded(&pow);
        let queue = PendingBlockQueue::new();
        add_pending_block(&queue, &repo, pending_with("tx"));
        let block = mine_block(&queue, &repo, &pow, 2).unwrap();

        let forged = format!("00{}", "f".repeat(62));
        assert!(matches!(
            add_block(&repo, block, &forged, &pow),
            Err(ChainError::InvalidProof { index: 1 })
        ));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_add_block_stale_parent_is_mismatch() {
        let pow = ProofOfWork::new(0);
        let repo = seeded(&pow);
        let queue = PendingBlockQueue::new();
        add_pending_block(&queue, &repo, pending_with("a"));
        add_pending_block(&queue, &repo, pending_with("b"));

        let first = mine_block(&queue, &repo, &pow, 2).unwrap();
        // Mined against genesis before `first` lands
        let stale = mine_block(&queue, &repo, &pow, 2).unwrap();
        add_block(&repo, first.clone(), first.hash_str(), &pow).unwrap();

        let err = add_block(&repo, stale.clone(), stale.hash_str(), &pow).unwrap_err();
        assert!(err.is_previous_hash_mismatch());
    }

    #[test]
    fn test_mint_block_has_no_puzzle() {
        let pow = ProofOfWork::new(0);
        let repo = seeded(&pow);
        let queue = PendingBlockQueue::new();
        assert!(mint_block(&queue, &repo, 2).is_none());

        add_pending_block(&queue, &repo, pending_with("tx"));
        let block = mint_block(&queue, &repo, 2).unwrap();
        assert_eq!(block.nonce, 0);
        assert_eq!(block.hash.as_deref(), Some(block.compute_hash().as_str()));
        assert_eq!(repo.len(), 1, "minting does not submit");
    }

    #[test]
    fn test_add_block_v2_reports_outcome() {
        let pow = ProofOfWork::new(0);
        let repo = seeded(&pow);
        let queue = PendingBlockQueue::new();
        add_pending_block(&queue, &repo, pending_with("tx"));
        let block = mint_block(&queue, &repo, 2).unwrap();

        assert!(add_block_v2(&repo, block.clone(), "forger"));
        assert!(!add_block_v2(&repo, block, "forger"));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_set_chain_rejects_invalid() {
        let pow = ProofOfWork::new(DIFFICULTY);
        let repo = seeded(&pow);
        let before = repo.get_chain();

        let mut bogus = Block::genesis(7);
        bogus.hash = Some("f".repeat(64));
        let unproven = Blockchain::new(vec![bogus]);
        let result = set_chain(unproven, &repo, &pow);
        assert!(matches!(result, Err(ChainError::InvalidBlockchain(_))));
        assert_eq!(repo.get_chain(), before);
    }

    #[test]
    fn test_reconcile_prefers_longer_valid_chain() {
        let pow = ProofOfWork::new(DIFFICULTY);
        let local = seeded(&pow);
        let peer = seeded(&pow);
        let queue = PendingBlockQueue::new();
        add_pending_block(&queue, &peer, pending_with("tx"));
        let block = mine_block(&queue, &peer, &pow, 2).unwrap();
        add_block(&peer, block.clone(), block.hash_str(), &pow).unwrap();

        assert!(!reconcile_chain(local.get_chain(), &peer, &pow).unwrap());
        assert!(reconcile_chain(peer.get_chain(), &local, &pow).unwrap());
        assert_eq!(local.len(), 2);
        assert!(check_chain_validity(&show_chain(&local), &pow));
    }

    #[test]
    fn test_adopt_longer_keeps_chain_that_grew_after_validation() {
        let pow = ProofOfWork::new(DIFFICULTY);
        let local = seeded(&pow);
        let peer = seeded(&pow);
        let queue = PendingBlockQueue::new();

        add_pending_block(&queue, &peer, pending_with("peer"));
        let theirs = mine_block(&queue, &peer, &pow, 2).unwrap();
        add_block(&peer, theirs.clone(), theirs.hash_str(), &pow).unwrap();
        let peer_chain = peer.get_chain();
        validate_chain(&peer_chain, &pow).unwrap();

        // The local miner lands a block between validation and the swap
        add_pending_block(&queue, &local, pending_with("local"));
        let ours = mine_block(&queue, &local, &pow, 2).unwrap();
        add_block(&local, ours.clone(), ours.hash_str(), &pow).unwrap();

        assert!(!adopt_longer(peer_chain, &local));
        assert_eq!(local.len(), 2);
        assert_eq!(local.get_last_block().unwrap().hash, ours.hash);
    }

    #[test]
    fn test_reconcile_rejects_longer_invalid_chain() {
        let pow = ProofOfWork::new(DIFFICULTY);
        let local = seeded(&pow);
        let mut forged = local.get_chain();
        forged
            .chain
            .push(Block::new(1, forged.chain[0].hash_str(), vec![], 1, vec![]));

        assert!(reconcile_chain(forged, &local, &pow).is_err());
        assert_eq!(local.len(), 1);
    }
}
