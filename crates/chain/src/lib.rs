//! Chain state and consensus orchestration for peerchain.
//!
//! This crate owns the mutable state of a node and the operations on it:
//! - **Repository**: the canonical chain behind one lock, with a scoped guard
//! - **Pending queue**: FIFO of record bundles awaiting consensus
//! - **Services**: enqueue, mine, mint, add, set and reconcile
//! - **Strategies**: proof-of-work, authority and proof-of-stake behind one trait
//! - **Quorum**: committee endorsement rounds for proof-of-stake
//!
//! # Example
//!
//! ```rust
//! use peerchain_chain::{services, ChainRepository, ConsensusStrategy, PendingBlockQueue, ProofOfWorkStrategy};
//! use peerchain_consensus::check_chain_validity;
//! use peerchain_core::{PendingBlock, Record};
//!
//! let strategy = ProofOfWorkStrategy::new(4, 2);
//! let repo = ChainRepository::new(strategy.genesis(0));
//! let queue = PendingBlockQueue::new();
//!
//! services::add_pending_block(&queue, &repo, PendingBlock::new(vec![Record::new(0, "hello")]));
//! let pow = strategy.proof_of_work();
//! let block = services::mine_block(&queue, &repo, &pow, 2).unwrap();
//! services::add_block(&repo, block.clone(), block.hash_str(), &pow).unwrap();
//!
//! assert!(check_chain_validity(&repo.get_chain(), &pow));
//! ```

pub mod config;
pub mod miners;
pub mod pending;
pub mod quorum;
pub mod repository;
pub mod services;
pub mod strategy;

// Re-export commonly used types
pub use config::{ConfigError, NodeConfig, DEFAULT_SIDE_LINKS};
pub use miners::KnownMiners;
pub use pending::PendingBlockQueue;
pub use quorum::{elect_committee, Committee, Endorser, QuorumOutcome, QuorumRound, ValidatorNode};
pub use repository::{Admission, ChainRepository, LockedChain, RepositoryError};
pub use services::ChainError;
pub use strategy::{
    seal_genesis, AuthorityStrategy, ConsensusStrategy, ProofOfStakeStrategy, ProofOfWorkStrategy,
    SealClaim, StrategyKind,
};
