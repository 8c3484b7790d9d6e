//! Data directory layout and the node it describes.
//!
//! ```text
//! <data_dir>/config.json     node configuration
//! <data_dir>/keys/node.json  node key pair
//! <data_dir>/chain.json      chain snapshot
//! <data_dir>/pending.json    pending queue
//! ```

use anyhow::{bail, Context, Result};
use peerchain_chain::NodeConfig;
use peerchain_core::{Blockchain, Keypair, PendingBlock, SigningAuthority};
use peerchain_node::{InMemoryBus, Node, Transport};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn key_path(&self) -> PathBuf {
        self.keys_dir().join("node.json")
    }

    pub fn chain_path(&self) -> PathBuf {
        self.root.join("chain.json")
    }

    pub fn pending_path(&self) -> PathBuf {
        self.root.join("pending.json")
    }

    pub fn load_config(&self) -> Result<NodeConfig> {
        NodeConfig::load(self.config_path())
            .context("Failed to read config.json. Did you run 'peerchain init'?")
    }

    pub fn save_keypair(&self, keypair: &Keypair) -> Result<()> {
        fs::create_dir_all(self.keys_dir())?;
        let key_json = json!({
            "address": keypair.address(),
            "private_key": keypair.private_key_hex(),
        });
        fs::write(self.key_path(), serde_json::to_string_pretty(&key_json)?)
            .with_context(|| format!("Failed to write {}", self.key_path().display()))
    }

    pub fn load_signer(&self) -> Result<SigningAuthority> {
        let contents = fs::read_to_string(self.key_path())
            .with_context(|| format!("Keypair file not found: {}", self.key_path().display()))?;
        let json: serde_json::Value = serde_json::from_str(&contents)?;
        let private_key = json
            .get("private_key")
            .and_then(|v| v.as_str())
            .context("Missing private_key in keypair file")?;
        SigningAuthority::from_private_hex(private_key).context("Invalid private key")
    }

    pub fn load_chain(&self) -> Result<Blockchain> {
        let contents = fs::read_to_string(self.chain_path())
            .context("Failed to read chain.json. Did you run 'peerchain init'?")?;
        let chain: Blockchain = serde_json::from_str(&contents).context("Corrupt chain.json")?;
        if chain.is_empty() {
            bail!("chain.json holds no blocks");
        }
        Ok(chain)
    }

    pub fn save_chain(&self, chain: &Blockchain) -> Result<()> {
        fs::write(self.chain_path(), serde_json::to_string_pretty(chain)?)
            .context("Failed to write chain.json")
    }

    /// Pending blocks, or none if the file does not exist yet.
    pub fn load_pending(&self) -> Result<Vec<PendingBlock>> {
        let path = self.pending_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        serde_json::from_str(&contents).context("Corrupt pending.json")
    }

    pub fn save_pending(&self, pending: &[PendingBlock]) -> Result<()> {
        fs::write(self.pending_path(), serde_json::to_string_pretty(pending)?)
            .context("Failed to write pending.json")
    }

    /// Build the node described by this directory, with its stored chain and
    /// pending queue loaded.
    pub fn open_node(&self, transport: Arc<dyn Transport>) -> Result<Node> {
        let config = self.load_config()?;
        let signer = self.load_signer()?;
        let node = Node::new(config, Some(signer), transport);
        node.restore(self.load_chain()?)
            .context("Stored chain failed validation")?;
        for pending in self.load_pending()? {
            node.queue().add(pending);
        }
        Ok(node)
    }

    /// Like [`DataDir::open_node`], on a private bus nobody listens to.
    pub fn open_offline_node(&self) -> Result<Node> {
        self.open_node(Arc::new(InMemoryBus::default()))
    }

    /// Persist the node's chain and pending queue.
    pub fn save_node(&self, node: &Node) -> Result<()> {
        self.save_chain(&node.repository().get_chain())?;
        self.save_pending(&node.queue().snapshot())
    }
}
