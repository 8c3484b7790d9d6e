//! Consensus primitives for peerchain.
//!
//! This crate holds the pure, storage-free parts of consensus:
//! - Proof-of-work mining and proof verification
//! - Stake bookkeeping and validator nomination
//! - Committee ballots and quorum arithmetic
//! - Trust authorities (address-as-proof and signature-backed)
//! - Whole-chain validity checks
//!
//! # Example
//!
//! ```rust
//! use peerchain_consensus::{check_chain_validity, ProofOfWork};
//! use peerchain_core::{Block, Blockchain};
//!
//! let pow = ProofOfWork::new(4);
//! let mut genesis = Block::genesis(0);
//! genesis.hash = Some(pow.mine(&mut genesis));
//!
//! assert!(check_chain_validity(&Blockchain::new(vec![genesis]), &pow));
//! ```

pub mod authority;
pub mod ballot;
pub mod pow;
pub mod stake;
pub mod validator;

// Re-export commonly used types
pub use authority::{AddressAuthority, AuthorityClaim, AuthorityError, SignedAuthority, SystemAuthority};
pub use ballot::{count_ballots, quorum_reached, tally_ballots};
pub use pow::{ProofOfWork, DEFAULT_DIFFICULTY};
pub use stake::{vote_for_validators, StakeRegister, DEFAULT_COMMITTEE_SIZE};
pub use validator::{check_chain_validity, validate_block, validate_chain, ValidationError};
