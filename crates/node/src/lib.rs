//! Node orchestration for peerchain.
//!
//! Wires the chain layer to a publish/subscribe transport:
//! - **Bus**: topics, envelopes and an in-process transport
//! - **Publisher**: typed `notify_*` helpers
//! - **Node**: per-topic handlers over one repository and queue
//! - **Miner**: the background worker that proposes and finalizes blocks

pub mod bus;
pub mod error;
pub mod miner;
pub mod node;
pub mod publisher;
pub mod runtime;

// Re-export commonly used types
pub use bus::{Envelope, InMemoryBus, Topic, Transport};
pub use error::{NodeError, Result};
pub use miner::{process_pending, spawn_miner, MiningOutcome};
pub use node::Node;
pub use publisher::{AuthorityHello, Endorsement, NewNode, Publisher};
pub use runtime::{spawn_listener, NodeRuntime};
