//! Node configuration.

use crate::strategy::StrategyKind;
use peerchain_consensus::{DEFAULT_COMMITTEE_SIZE, DEFAULT_DIFFICULTY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when loading or saving a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Default number of side links per block.
pub const DEFAULT_SIDE_LINKS: usize = 2;

/// Per-node settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's address.
    pub node_id: String,
    /// Whether the node may mine under the authority strategy.
    pub trusted: bool,
    pub strategy: StrategyKind,
    /// Leading zero bits required by proof-of-work.
    pub difficulty: u32,
    pub side_links: usize,
    pub committee_size: usize,
    /// Shared by every node so all of them seed the same genesis.
    pub genesis_timestamp: u64,
    /// Sleep between polls of an empty pending queue.
    pub mining_backoff_ms: u64,
    /// Votes a node needs before it mines voted records.
    pub votes_required: usize,
    /// Authority nodes known at start.
    pub known_miners: Vec<String>,
    /// Stake per validator address, identical on every proof-of-stake node.
    pub stakes: BTreeMap<String, f64>,
    /// How long a minted block waits for committee endorsements.
    pub endorsement_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            trusted: false,
            strategy: StrategyKind::default(),
            difficulty: DEFAULT_DIFFICULTY,
            side_links: DEFAULT_SIDE_LINKS,
            committee_size: DEFAULT_COMMITTEE_SIZE,
            genesis_timestamp: 0,
            mining_backoff_ms: 500,
            votes_required: 1,
            known_miners: Vec::new(),
            stakes: BTreeMap::new(),
            endorsement_timeout_ms: 2000,
        }
    }
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.difficulty, 16);
        assert_eq!(config.side_links, 2);
        assert_eq!(config.committee_size, 4);
        assert_eq!(config.strategy, StrategyKind::ProofOfWork);
        assert!(!config.trusted);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"node_id": "abc", "strategy": "authority"}"#).unwrap();
        assert_eq!(config.node_id, "abc");
        assert_eq!(config.strategy, StrategyKind::Authority);
        assert_eq!(config.mining_backoff_ms, 500);
        assert!(config.stakes.is_empty());
        assert_eq!(config.endorsement_timeout_ms, 2000);
    }

    #[test]
    fn test_stakes_from_json() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"strategy": "proof_of_stake", "stakes": {"b": 30.0, "a": 10}}"#).unwrap();
        let holders: Vec<(&str, f64)> = config.stakes.iter().map(|(a, s)| (a.as_str(), *s)).collect();
        assert_eq!(holders, vec![("a", 10.0), ("b", 30.0)]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = NodeConfig {
            node_id: "node".into(),
            trusted: true,
            known_miners: vec!["m1".into()],
            difficulty: 8,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(NodeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            NodeConfig::load(dir.path().join("nope.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
