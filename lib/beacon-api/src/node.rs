//! Peer node descriptors

use serde::{Deserialize, Serialize};

/// Reachability of a peer as last observed by the replication workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Up,
    Lost,
}

/// Descriptor of a peer cluster member, used for peer-aware client routing
/// and status reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDesc {
    pub addr: String,
    pub zone: String,
    pub status: NodeStatus,
}
