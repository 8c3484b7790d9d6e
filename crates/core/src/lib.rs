//! Core ledger primitives for peerchain.
//!
//! This crate provides the value types shared by every layer:
//! - Hashing (Blake3 digests, leading-zero-bit counting)
//! - Records, pending record bundles and miner votes
//! - Blocks and chain snapshots
//! - Key pairs and the signed-token authority

pub mod block;
pub mod crypto;
pub mod hash;
pub mod record;

// Re-export commonly used types at the crate root
pub use block::{current_timestamp, Block, Blockchain, GENESIS_PREVIOUS_HASH};
pub use crypto::{generate_keypair, CryptoError, Keypair, PublicKey, SigningAuthority};
pub use hash::{hash, Hash, H256};
pub use record::{PendingBlock, Record, Vote};
