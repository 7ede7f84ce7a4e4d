//! Replication seam between the discovery facade and the cluster

use async_trait::async_trait;
use beacon_api::{Action, Instance, NodeDesc};

/// Fan-out of a registry mutation to the rest of the cluster.
///
/// Implementations must be fire-and-forget: a call returns as soon as the
/// work is queued, per-peer failures are isolated and logged, and nothing
/// propagates back to the client-facing request that triggered it.
#[async_trait]
pub trait Replicator: Send + Sync {
    /// Queue `action` on the instance for delivery to peers. `cross_zone`
    /// is true when the originating request came from outside this node's
    /// zone.
    async fn replicate(&self, action: Action, instance: Instance, cross_zone: bool);

    /// Ordered peer descriptors, for client routing and status reporting.
    fn nodes(&self) -> Vec<NodeDesc>;
}
