//! Node error types.

use crate::bus::Topic;
use peerchain_chain::ChainError;
use peerchain_consensus::AuthorityError;
use thiserror::Error;

/// Errors that can occur while running a node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("cannot encode payload for {topic}: {source}")]
    Encode {
        topic: Topic,
        source: serde_json::Error,
    },

    #[error("cannot decode payload on {topic}: {source}")]
    Decode {
        topic: Topic,
        source: serde_json::Error,
    },

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("authority error: {0}")]
    Authority(#[from] AuthorityError),
}

pub type Result<T> = std::result::Result<T, NodeError>;
