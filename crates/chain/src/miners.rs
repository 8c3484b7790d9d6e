//! Registry of authority nodes allowed to mine.

use parking_lot::RwLock;
use peerchain_consensus::SystemAuthority;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

/// Known authority addresses, in discovery order.
#[derive(Debug, Default)]
pub struct KnownMiners {
    miners: RwLock<Vec<String>>,
}

impl KnownMiners {
    /// Create a registry seeded with `miners`; duplicates are dropped.
    pub fn new(miners: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for miner in miners {
            if !unique.contains(&miner) {
                unique.push(miner);
            }
        }
        Self {
            miners: RwLock::new(unique),
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.miners.read().iter().any(|m| m == node_id)
    }

    /// Add `node_id` without any proof check. Returns false if already known.
    pub fn insert(&self, node_id: &str) -> bool {
        let mut miners = self.miners.write();
        if miners.iter().any(|m| m == node_id) {
            return false;
        }
        miners.push(node_id.to_string());
        true
    }

    /// Register an announced authority if its proof checks out.
    ///
    /// Returns true only when the node was newly added.
    pub fn add_authority_node(&self, node_id: &str, proof: &str, authority: &dyn SystemAuthority) -> bool {
        if !authority.verify_proof(node_id, proof) {
            warn!(node_id, "Rejected authority with invalid proof");
            return false;
        }
        let added = self.insert(node_id);
        if added {
            debug!(node_id, "Authority node registered");
        }
        added
    }

    /// Pick a known miner uniformly at random.
    pub fn choose(&self) -> Option<String> {
        self.miners.read().choose(&mut rand::thread_rng()).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.miners.read().clone()
    }

    pub fn len(&self) -> usize {
        self.miners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.miners.read().is_empty()
    }
}
