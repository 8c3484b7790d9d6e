//! Running a node: the bus listener plus the mining worker.

use crate::bus::{Envelope, Transport};
use crate::error::Result;
use crate::miner::spawn_miner;
use crate::node::Node;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawn the task that feeds bus envelopes to the node's handlers.
pub fn spawn_listener(
    node: Arc<Node>,
    mut events: broadcast::Receiver<Envelope>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("listener received shutdown signal");
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(envelope) => {
                        if let Err(e) = node.handle(&envelope) {
                            warn!(topic = %envelope.topic, "Failed to handle message: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("bus closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lagged on bus");
                    }
                },
            }
        }
    })
}

/// A started node and its background tasks.
pub struct NodeRuntime {
    node: Arc<Node>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Subscribe to `transport`, start the listener and the worker, then
    /// announce the node.
    pub fn start(node: Arc<Node>, transport: &dyn Transport) -> Result<Self> {
        let (shutdown, rx) = watch::channel(false);
        let events = transport.subscribe();
        let tasks = vec![
            spawn_listener(Arc::clone(&node), events, rx.clone()),
            spawn_miner(Arc::clone(&node), rx),
        ];
        node.announce()?;
        info!(node_id = node.node_id(), "Node started");
        Ok(Self {
            node,
            shutdown,
            tasks,
        })
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Stop both tasks and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("node task failed: {}", e);
            }
        }
        info!(node_id = self.node.node_id(), "Node stopped");
    }
}
