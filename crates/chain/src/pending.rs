//! FIFO queue of record bundles waiting for consensus.

use parking_lot::Mutex;
use peerchain_core::PendingBlock;
use std::collections::VecDeque;

/// Thread-safe FIFO of pending blocks.
///
/// `pop` never waits: an empty queue yields `None` and the caller decides
/// how to back off.
#[derive(Debug, Default)]
pub struct PendingBlockQueue {
    blocks: Mutex<VecDeque<PendingBlock>>,
}

impl PendingBlockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue holding `blocks` in order.
    pub fn from_blocks(blocks: Vec<PendingBlock>) -> Self {
        Self {
            blocks: Mutex::new(blocks.into()),
        }
    }

    pub fn add(&self, block: PendingBlock) {
        self.blocks.lock().push_back(block);
    }

    /// Remove and return the oldest pending block.
    pub fn pop(&self) -> Option<PendingBlock> {
        self.blocks.lock().pop_front()
    }

    /// Number of queued blocks at the time of the call.
    pub fn pending_blocks_count(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Copy of the queued blocks, oldest first.
    pub fn snapshot(&self) -> Vec<PendingBlock> {
        self.blocks.lock().iter().cloned().collect()
    }
}
