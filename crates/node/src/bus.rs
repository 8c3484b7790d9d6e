//! Topic-based publish/subscribe boundary.
//!
//! Nodes only see [`Transport`]. [`InMemoryBus`] delivers every envelope to
//! every subscriber in publish order, which is enough to run several nodes
//! inside one process.

use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast;
use tracing::debug;

/// Routing keys understood by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "chain.command.mine")]
    CommandMine,
    #[serde(rename = "chain.command.show_chain")]
    CommandShowChain,
    #[serde(rename = "chain.event.block_mined")]
    BlockMined,
    #[serde(rename = "chain.event.show_chain")]
    ShowChain,
    #[serde(rename = "chain.event.set_chain")]
    SetChain,
    #[serde(rename = "chain.event.node_voted")]
    NodeVoted,
    #[serde(rename = "chain.event.authority_hello")]
    AuthorityHello,
    #[serde(rename = "chain.event.new_node")]
    NewNode,
    #[serde(rename = "chain.event.block_proposed")]
    BlockProposed,
    #[serde(rename = "chain.event.block_endorsed")]
    BlockEndorsed,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Topic::CommandMine,
        Topic::CommandShowChain,
        Topic::BlockMined,
        Topic::ShowChain,
        Topic::SetChain,
        Topic::NodeVoted,
        Topic::AuthorityHello,
        Topic::NewNode,
        Topic::BlockProposed,
        Topic::BlockEndorsed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CommandMine => "chain.command.mine",
            Topic::CommandShowChain => "chain.command.show_chain",
            Topic::BlockMined => "chain.event.block_mined",
            Topic::ShowChain => "chain.event.show_chain",
            Topic::SetChain => "chain.event.set_chain",
            Topic::NodeVoted => "chain.event.node_voted",
            Topic::AuthorityHello => "chain.event.authority_hello",
            Topic::NewNode => "chain.event.new_node",
            Topic::BlockProposed => "chain.event.block_proposed",
            Topic::BlockEndorsed => "chain.event.block_endorsed",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| NodeError::Transport(format!("unknown topic: {s}")))
    }
}

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    /// Node id of the publisher; empty for external clients.
    #[serde(default)]
    pub sender: String,
    pub payload: Value,
}

impl Envelope {
    /// Encode `payload` for `topic`.
    pub fn new<T: Serialize>(topic: Topic, sender: impl Into<String>, payload: &T) -> Result<Self> {
        let payload =
            serde_json::to_value(payload).map_err(|source| NodeError::Encode { topic, source })?;
        Ok(Self {
            topic,
            sender: sender.into(),
            payload,
        })
    }

    /// Decode the payload as `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|source| NodeError::Decode {
            topic: self.topic,
            source,
        })
    }
}

/// Publish/subscribe transport.
pub trait Transport: Send + Sync {
    fn publish(&self, envelope: Envelope) -> Result<()>;

    /// Receive every envelope published after this call.
    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
}

/// In-process transport on a broadcast channel.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    sender: broadcast::Sender<Envelope>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Transport for InMemoryBus {
    fn publish(&self, envelope: Envelope) -> Result<()> {
        let topic = envelope.topic;
        match self.sender.send(envelope) {
            Ok(receivers) => debug!(%topic, receivers, "published"),
            // Nobody listening is not a failure for pub/sub
            Err(_) => debug!(%topic, "published with no subscribers"),
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}
