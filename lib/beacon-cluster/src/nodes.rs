//! Peer set and zone-aware replication fan-out

use crate::node::{Node, ReplicationJob};
use crate::replicator::Replicator;
use anyhow::Result;
use async_trait::async_trait;
use beacon_api::{Action, Instance, NodeDesc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Configured peer address, as it appears in the node list of the config
/// file.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub addr: String,
    pub zone: String,
}

/// The known peer set of this node. Read-mostly: built once from config,
/// fanned out to on every locally originated mutation.
pub struct Nodes {
    nodes: Vec<Node>,
    zone: String,
}

impl Nodes {
    /// Build the peer set, skipping this node's own address.
    pub fn new(
        self_addr: &str,
        zone: &str,
        peers: &[Peer],
        timeout: Duration,
        queue: usize,
    ) -> Result<Self> {
        let mut nodes = Vec::new();
        for peer in peers {
            if peer.addr == self_addr {
                continue;
            }
            nodes.push(Node::new(peer.addr.clone(), peer.zone.clone(), timeout, queue)?);
        }
        nodes.sort_by(|a, b| a.addr().cmp(b.addr()));
        Ok(Self {
            nodes,
            zone: zone.to_string(),
        })
    }

    /// Peers a mutation fans out to. A mutation that already crossed a zone
    /// boundary only propagates within this node's zone, which is what
    /// keeps replication loop-free across zones.
    fn targets(&self, cross_zone: bool) -> impl Iterator<Item = &Node> {
        let zone = &self.zone;
        self.nodes
            .iter()
            .filter(move |node| !cross_zone || node.zone() == zone)
    }
}

#[async_trait]
impl Replicator for Nodes {
    async fn replicate(&self, action: Action, instance: Instance, cross_zone: bool) {
        for node in self.targets(cross_zone) {
            debug!(peer = %node.addr(), ?action, appid = %instance.appid, "queueing replication");
            node.dispatch(ReplicationJob {
                action,
                instance: instance.clone(),
            });
        }
    }

    fn nodes(&self) -> Vec<NodeDesc> {
        self.nodes.iter().map(Node::desc).collect()
    }
}
