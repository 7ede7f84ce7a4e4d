//! Cluster membership and best-effort peer replication
//!
//! This library provides:
//! - The Replicator seam the discovery facade fans mutations through
//! - Per-peer replication workers with bounded queues and call timeouts
//! - The zone-aware fan-out policy that stops cross-zone ping-pong

pub mod node;
pub mod nodes;
pub mod replicator;

pub use node::Node;
pub use nodes::{Nodes, Peer};
pub use replicator::Replicator;
