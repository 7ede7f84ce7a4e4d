//! Discovery facade composing the registry and the cluster
//!
//! Enforces the single invariant that prevents replication storms: a
//! mutation is fanned out to peers only when the inbound request did not
//! itself come from replication.

use beacon_api::{
    Action, ArgCancel, ArgFetch, ArgFetchs, ArgPolls, ArgRegister, ArgRenew, Instance,
    InstanceInfo, NodeDesc,
};
use beacon_cluster::Replicator;
use beacon_core::{NotifyHandle, Registry, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Client- and peer-facing operation surface of one discovery node.
pub struct Discovery {
    zone: String,
    registry: Arc<Registry>,
    nodes: Arc<dyn Replicator>,
}

impl Discovery {
    pub fn new(zone: impl Into<String>, registry: Arc<Registry>, nodes: Arc<dyn Replicator>) -> Self {
        Self {
            zone: zone.into(),
            registry,
            nodes,
        }
    }

    fn cross_zone(&self, zone: &str) -> bool {
        zone != self.zone
    }

    /// Register a new instance. Always succeeds locally; fans out to peers
    /// unless the request itself came from replication.
    pub async fn register(&self, ins: Instance, arg: &ArgRegister) {
        self.registry.register(ins.clone(), arg.latest_timestamp).await;
        if !arg.replication {
            self.nodes
                .replicate(Action::Register, ins, self.cross_zone(&arg.zone))
                .await;
        }
    }

    /// Renew an instance's liveness. A replicated renewal surfaces the
    /// conflict-resolution result instead of fanning out again.
    pub async fn renew(&self, arg: &ArgRenew) -> Result<Instance> {
        let ins = match self.registry.renew(arg).await {
            Ok(ins) => ins,
            Err(err) => {
                error!(
                    appid = %arg.appid,
                    hostname = %arg.hostname,
                    zone = %arg.zone,
                    env = %arg.env,
                    %err,
                    "renew failed"
                );
                return Err(err);
            }
        };
        if !arg.replication {
            self.nodes
                .replicate(Action::Renew, ins.clone(), self.cross_zone(&arg.zone))
                .await;
        }
        Ok(ins)
    }

    /// Cancel an instance's registration.
    pub async fn cancel(&self, arg: &ArgCancel) -> Result<()> {
        let ins = match self.registry.cancel(arg).await {
            Ok(ins) => ins,
            Err(err) => {
                error!(appid = %arg.appid, hostname = %arg.hostname, %err, "cancel failed");
                return Err(err);
            }
        };
        if !arg.replication {
            self.nodes
                .replicate(Action::Cancel, ins, self.cross_zone(&arg.zone))
                .await;
        }
        Ok(())
    }

    /// Full snapshot of every appid.
    pub async fn fetch_all(&self) -> HashMap<String, Vec<Instance>> {
        self.registry.fetch_all().await
    }

    /// Fetch the instances of one appid.
    pub async fn fetch(&self, arg: &ArgFetch) -> Result<InstanceInfo> {
        self.registry
            .fetch(&arg.zone, &arg.env, &arg.appid, 0, arg.status)
            .await
    }

    /// Batch fetch; failing appids are omitted, never fail the batch.
    pub async fn fetchs(&self, arg: &ArgFetchs) -> HashMap<String, InstanceInfo> {
        self.registry.fetchs(arg).await
    }

    /// Hang the request until one of the polled appids changes, or deliver
    /// immediately when the caller is behind.
    pub async fn polls(&self, arg: &ArgPolls) -> Result<(Arc<NotifyHandle>, bool)> {
        self.registry.polls(arg).await
    }

    /// Drop the caller's poll subscriptions, e.g. on disconnect.
    pub async fn del_conns(&self, arg: &ArgPolls) {
        self.registry.del_conns(arg).await;
    }

    /// Peer descriptors of this cluster.
    pub fn nodes(&self) -> Vec<NodeDesc> {
        self.nodes.nodes()
    }

    /// Return a notify handle to the reuse pool.
    pub async fn put_chan(&self, handle: Arc<NotifyHandle>) {
        self.registry.put_chan(handle).await;
    }
}
