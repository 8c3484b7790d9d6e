//! The mining/minting worker.
//!
//! Polls the pending queue, backs off while it is empty, and runs the
//! strategy's CPU-bound proposal on the blocking pool so handlers keep
//! running. A proposal that needs committee endorsements waits for them on
//! the same thread.

use crate::error::NodeError;
use crate::node::Node;
use peerchain_core::{Block, PendingBlock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What became of one pending block.
#[derive(Debug, Clone)]
pub enum MiningOutcome {
    /// Finalized locally and announced.
    Mined(Block),
    /// A peer's block made the work obsolete.
    Cancelled,
    /// Finalization refused the block.
    Rejected,
    /// No block could be proposed.
    Failed,
}

/// Propose, gather endorsements, finalize and announce one pending block.
pub fn process_pending(node: &Node, pending: PendingBlock) -> MiningOutcome {
    let cancel = node.begin_mining(pending.index);
    let proposed = node
        .strategy()
        .propose(node.repository(), pending.clone(), &cancel)
        .map_err(NodeError::from)
        .and_then(|block| match block {
            Some(block) => node.gather_endorsements(block, &cancel),
            None => Ok(None),
        });
    node.end_mining();

    let block = match proposed {
        Ok(Some(block)) => block,
        Ok(None) => {
            requeue_unless_mined(node, pending);
            return MiningOutcome::Cancelled;
        }
        Err(e) => {
            error!(index = pending.index, "Cannot propose block: {}", e);
            return MiningOutcome::Failed;
        }
    };

    match node.strategy().finalize(node.repository(), block.clone()) {
        Ok(true) => {
            info!(index = block.index, hash = block.hash_str(), "Block mined");
            if let Err(e) = node.publisher().notify_block_mined(&block) {
                warn!("Failed to announce block: {}", e);
            }
            MiningOutcome::Mined(block)
        }
        Ok(false) => {
            warn!(index = block.index, "Mined block was refused");
            MiningOutcome::Rejected
        }
        Err(e) => {
            warn!(index = block.index, "Mined block was not accepted: {}", e);
            requeue_unless_mined(node, pending);
            MiningOutcome::Rejected
        }
    }
}

/// Put `pending` back unless a block with the same records already landed.
fn requeue_unless_mined(node: &Node, pending: PendingBlock) {
    let mined = node
        .repository()
        .lock()
        .blocks()
        .iter()
        .any(|b| b.records == pending.records);
    if mined {
        debug!(index = pending.index, "Records already on chain, dropping");
        return;
    }
    node.add_pending(pending);
}

/// Spawn the worker; it stops when `shutdown` turns true or its sender drops.
pub fn spawn_miner(node: Arc<Node>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let backoff = Duration::from_millis(node.config().mining_backoff_ms);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let pending = match node.queue().pop() {
                Some(pending) => pending,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    continue;
                }
            };

            let worker = Arc::clone(&node);
            let mut task = tokio::task::spawn_blocking(move || process_pending(&worker, pending));
            tokio::select! {
                result = &mut task => {
                    if let Err(e) = result {
                        error!("Mining task failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    node.cancel_mining_up_to(u64::MAX);
                    let _ = task.await;
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Miner stopped");
    })
}
