//! Records, pending bundles of records, and miner votes.

use crate::block::current_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single unit of user data carried by a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Client-assigned index of the record.
    pub index: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Arbitrary JSON payload.
    pub content: Value,
}

impl Record {
    /// Create a record stamped with the current time.
    pub fn new(index: u64, content: impl Into<Value>) -> Self {
        Self {
            index,
            timestamp: current_timestamp(),
            content: content.into(),
        }
    }

    /// Create a record with an explicit timestamp.
    pub fn with_timestamp(index: u64, timestamp: u64, content: impl Into<Value>) -> Self {
        Self {
            index,
            timestamp,
            content: content.into(),
        }
    }
}

/// A bundle of records waiting for consensus.
///
/// The index is provisional; it is reassigned when the bundle is enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBlock {
    pub index: u64,
    pub records: Vec<Record>,
}

impl PendingBlock {
    pub fn new(records: Vec<Record>) -> Self {
        Self { index: 0, records }
    }
}

/// A nomination of a miner for a set of records, broadcast by nodes that are
/// not authorities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Address of the nominated miner.
    pub node_id: String,
    pub records: Vec<Record>,
}

impl Vote {
    pub fn new(node_id: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            node_id: node_id.into(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_json_roundtrip_keeps_structured_content() {
        let record = Record::with_timestamp(3, 1_700_000_000, json!({"from": "a", "amount": 5}));
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: Record = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.content["amount"], 5);
    }

    #[test]
    fn test_pending_block_starts_unindexed() {
        let pending = PendingBlock::new(vec![Record::new(0, "tx")]);
        assert_eq!(pending.index, 0);
        assert_eq!(pending.records.len(), 1);
    }

    #[test]
    fn test_vote_wire_format() {
        let vote = Vote::new("abcd", vec![Record::with_timestamp(0, 10, "hello")]);
        let value = serde_json::to_value(&vote).unwrap();
        assert_eq!(value["node_id"], "abcd");
        assert_eq!(value["records"][0]["content"], "hello");
    }
}
