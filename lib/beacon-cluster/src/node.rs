//! A single peer and its replication worker

use anyhow::Result;
use beacon_api::{Action, ArgCancel, ArgRegister, ArgRenew, Instance, NodeDesc, NodeStatus};
use beacon_core::CoreError;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One queued mutation bound for a peer.
#[derive(Clone, Debug)]
pub(crate) struct ReplicationJob {
    pub action: Action,
    pub instance: Instance,
}

impl ReplicationJob {
    pub(crate) fn path(&self) -> &'static str {
        match self.action {
            Action::Register => "/discovery/register",
            Action::Renew => "/discovery/renew",
            Action::Cancel => "/discovery/cancel",
        }
    }
}

/// Minimal view of a peer's response envelope; only the code matters here.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
}

/// A peer node: descriptor plus a bounded work queue consumed by a spawned
/// worker. The queue exerts no backpressure on callers; when it is full the
/// job is dropped and logged.
pub struct Node {
    addr: String,
    zone: String,
    lost: Arc<AtomicBool>,
    tx: mpsc::Sender<ReplicationJob>,
}

impl Node {
    pub fn new(addr: String, zone: String, timeout: Duration, queue: usize) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (tx, rx) = mpsc::channel(queue);
        let lost = Arc::new(AtomicBool::new(false));
        tokio::spawn(worker(client, addr.clone(), rx, lost.clone()));
        Ok(Self {
            addr,
            zone,
            lost,
            tx,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn desc(&self) -> NodeDesc {
        NodeDesc {
            addr: self.addr.clone(),
            zone: self.zone.clone(),
            status: if self.lost.load(Ordering::Relaxed) {
                NodeStatus::Lost
            } else {
                NodeStatus::Up
            },
        }
    }

    /// Queue a job without blocking. A full queue drops the job: the peer
    /// will converge through later mutations or client re-registration.
    pub(crate) fn dispatch(&self, job: ReplicationJob) {
        if self.tx.try_send(job).is_err() {
            warn!(peer = %self.addr, "replication queue full, job dropped");
        }
    }
}

async fn worker(
    client: reqwest::Client,
    addr: String,
    mut rx: mpsc::Receiver<ReplicationJob>,
    lost: Arc<AtomicBool>,
) {
    while let Some(job) = rx.recv().await {
        match deliver(&client, &addr, &job).await {
            Ok(()) => lost.store(false, Ordering::Relaxed),
            Err(err) => {
                lost.store(true, Ordering::Relaxed);
                warn!(peer = %addr, action = ?job.action, %err, "replication to peer failed");
            }
        }
    }
}

/// Deliver one job to the peer. A renewal the peer has never heard of is
/// recovered by following up with a full register of the instance.
async fn deliver(client: &reqwest::Client, addr: &str, job: &ReplicationJob) -> Result<()> {
    let code = call(client, addr, job).await?;
    match CoreError::from_code(code) {
        None if code == 0 => Ok(()),
        Some(CoreError::NothingFound) if job.action == Action::Renew => {
            debug!(peer = %addr, appid = %job.instance.appid, "peer missed instance, re-registering");
            let register = ReplicationJob {
                action: Action::Register,
                instance: job.instance.clone(),
            };
            let code = call(client, addr, &register).await?;
            if code == 0 {
                Ok(())
            } else {
                Err(anyhow::anyhow!("peer register after missed renew: code {code}"))
            }
        }
        Some(CoreError::Conflict) => {
            // The peer holds a newer write-version; it will replicate its
            // authoritative copy back to us.
            debug!(peer = %addr, appid = %job.instance.appid, "peer ahead of local state");
            Ok(())
        }
        _ => Err(anyhow::anyhow!("peer answered code {code}")),
    }
}

async fn call(client: &reqwest::Client, addr: &str, job: &ReplicationJob) -> Result<i64> {
    let url = format!("http://{}{}", addr, job.path());
    let response = match &job.action {
        Action::Register => client.post(&url).json(&register_arg(&job.instance)).send(),
        Action::Renew => client.post(&url).json(&renew_arg(&job.instance)).send(),
        Action::Cancel => client.post(&url).json(&cancel_arg(&job.instance)).send(),
    }
    .await?;
    let envelope: Envelope = response.json().await?;
    Ok(envelope.code)
}

fn register_arg(ins: &Instance) -> ArgRegister {
    ArgRegister {
        zone: ins.zone.clone(),
        env: ins.env.clone(),
        appid: ins.appid.clone(),
        hostname: ins.hostname.clone(),
        status: ins.status,
        addrs: ins.addrs.clone(),
        version: ins.version.clone(),
        metadata: ins.metadata.clone(),
        dirty_timestamp: ins.dirty_timestamp,
        latest_timestamp: ins.latest_timestamp,
        replication: true,
    }
}

fn renew_arg(ins: &Instance) -> ArgRenew {
    ArgRenew {
        zone: ins.zone.clone(),
        env: ins.env.clone(),
        appid: ins.appid.clone(),
        hostname: ins.hostname.clone(),
        dirty_timestamp: ins.dirty_timestamp,
        replication: true,
    }
}

fn cancel_arg(ins: &Instance) -> ArgCancel {
    ArgCancel {
        zone: ins.zone.clone(),
        env: ins.env.clone(),
        appid: ins.appid.clone(),
        hostname: ins.hostname.clone(),
        latest_timestamp: ins.latest_timestamp,
        replication: true,
    }
}
