//! Blocks and chain snapshots.

use crate::hash::{hash, Hash};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Get the current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}

/// A block of records linked to its parent by `previous_hash`.
///
/// Two blocks compare equal when they occupy the same slot in the chain,
/// i.e. share `index` and `previous_hash`. Competing proposals for the same
/// height are therefore "the same block" even if nonce or timestamp differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Height of the block (0 for genesis).
    pub index: u64,
    /// Hex hash of the parent block, `"0"` for genesis.
    pub previous_hash: String,
    /// Hashes of earlier, non-parent blocks.
    pub side_links: Vec<String>,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    pub records: Vec<Record>,
    /// Hex hash of the block, `None` until computed.
    #[serde(default)]
    pub hash: Option<String>,
    /// Proof-of-work counter.
    #[serde(default)]
    pub nonce: u64,
    /// Seal token issued by the producing authority.
    #[serde(default)]
    pub signature: Option<String>,
    /// Tokens from validator committee members vouching for `hash`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endorsements: Vec<String>,
}

/// Hash input: every field except the hash and the tokens signed over it.
#[derive(Serialize)]
struct HashInput<'a> {
    index: u64,
    previous_hash: &'a str,
    side_links: &'a [String],
    timestamp: u64,
    records: &'a [Record],
    nonce: u64,
}

impl Block {
    /// Create an unhashed block with nonce 0.
    pub fn new(
        index: u64,
        previous_hash: impl Into<String>,
        side_links: Vec<String>,
        timestamp: u64,
        records: Vec<Record>,
    ) -> Self {
        Self {
            index,
            previous_hash: previous_hash.into(),
            side_links,
            timestamp,
            records,
            hash: None,
            nonce: 0,
            signature: None,
            endorsements: Vec::new(),
        }
    }

    /// Create the genesis block with its hash filled in.
    pub fn genesis(timestamp: u64) -> Self {
        let mut block = Self::new(0, GENESIS_PREVIOUS_HASH, Vec::new(), timestamp, Vec::new());
        block.hash = Some(block.compute_hash());
        block
    }

    /// Digest of the canonical encoding of the block.
    pub fn digest(&self) -> Hash {
        let input = HashInput {
            index: self.index,
            previous_hash: &self.previous_hash,
            side_links: &self.side_links,
            timestamp: self.timestamp,
            records: &self.records,
            nonce: self.nonce,
        };
        let encoded = bincode::serialize(&input).expect("serialization should not fail");
        hash(&encoded)
    }

    /// Hex hash of the block, excluding `hash`, `signature` and
    /// `endorsements`.
    pub fn compute_hash(&self) -> String {
        self.digest().to_hex()
    }

    /// The stored hash, or the empty string when none has been computed.
    pub fn hash_str(&self) -> &str {
        self.hash.as_deref().unwrap_or("")
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.previous_hash == other.previous_hash
    }
}

impl Eq for Block {}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| self.previous_hash.cmp(&other.previous_hash))
    }
}

/// An owned snapshot of a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blockchain {
    pub chain: Vec<Block>,
}

impl Blockchain {
    pub fn new(chain: Vec<Block>) -> Self {
        Self { chain }
    }

    pub fn length(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }
}
