//! Typed helpers for publishing on the bus.

use crate::bus::{Envelope, Topic, Transport};
use crate::error::Result;
use peerchain_core::{Block, Blockchain, Record, Vote};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload of `chain.event.authority_hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityHello {
    pub node_id: String,
    pub proof: String,
}

/// Payload of `chain.event.new_node`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub node_id: String,
}

/// Payload of `chain.event.block_endorsed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// Hash of the proposed block.
    pub hash: String,
    pub token: String,
}

/// Publishes on behalf of one node.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    sender: String,
}

impl Publisher {
    /// `sender` is stamped on every envelope; use an empty string for
    /// clients that are not nodes.
    pub fn new(transport: Arc<dyn Transport>, sender: impl Into<String>) -> Self {
        Self {
            transport,
            sender: sender.into(),
        }
    }

    fn publish<T: Serialize>(&self, topic: Topic, payload: &T) -> Result<()> {
        self.transport
            .publish(Envelope::new(topic, self.sender.clone(), payload)?)
    }

    pub fn notify_add_record(&self, record: &Record) -> Result<()> {
        self.publish(Topic::CommandMine, record)
    }

    pub fn notify_show_chain(&self) -> Result<()> {
        self.publish(Topic::CommandShowChain, &())
    }

    pub fn notify_block_mined(&self, block: &Block) -> Result<()> {
        self.publish(Topic::BlockMined, block)
    }

    pub fn notify_event_show_chain(&self, chain: &Blockchain) -> Result<()> {
        self.publish(Topic::ShowChain, chain)
    }

    pub fn notify_set_chain(&self, chain: &Blockchain) -> Result<()> {
        self.publish(Topic::SetChain, chain)
    }

    pub fn notify_node_voted(&self, vote: &Vote) -> Result<()> {
        self.publish(Topic::NodeVoted, vote)
    }

    pub fn notify_authority_hello(&self, node_id: &str, proof: &str) -> Result<()> {
        let hello = AuthorityHello {
            node_id: node_id.to_string(),
            proof: proof.to_string(),
        };
        self.publish(Topic::AuthorityHello, &hello)
    }

    pub fn notify_block_proposed(&self, block: &Block) -> Result<()> {
        self.publish(Topic::BlockProposed, block)
    }

    pub fn notify_block_endorsed(&self, hash: &str, token: &str) -> Result<()> {
        let endorsement = Endorsement {
            hash: hash.to_string(),
            token: token.to_string(),
        };
        self.publish(Topic::BlockEndorsed, &endorsement)
    }

    pub fn notify_new_node(&self, node_id: &str) -> Result<()> {
        let new_node = NewNode {
            node_id: node_id.to_string(),
        };
        self.publish(Topic::NewNode, &new_node)
    }
}
