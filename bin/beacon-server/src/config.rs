//! Server configuration, loaded from an optional YAML file

use anyhow::{Context, Result};
use beacon_cluster::Peer;
use serde::Deserialize;
use std::path::Path;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Zone this node serves; requests from other zones replicate with the
    /// cross-zone flag set.
    pub zone: String,
    /// Address the HTTP API listens on, also this node's identity in the
    /// peer list.
    pub http_addr: String,
    /// Every cluster member, usually including this node itself.
    pub nodes: Vec<Peer>,
    /// How long a poll request hangs before answering NotModified.
    pub poll_wait_secs: u64,
    /// Timeout of a single replication call to one peer.
    pub replication_timeout_ms: u64,
    /// Bounded per-peer replication queue length.
    pub replication_queue: usize,
    /// How often the reaper scans for lapsed instances.
    pub reaper_interval_secs: u64,
    /// Renewal silence after which an instance is cancelled.
    pub instance_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone: "default".to_string(),
            http_addr: "0.0.0.0:7171".to_string(),
            nodes: Vec::new(),
            poll_wait_secs: 30,
            replication_timeout_ms: 1000,
            replication_queue: 256,
            reaper_interval_secs: 30,
            instance_ttl_secs: 90,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load from the path given as the first CLI argument, or fall back to
    /// defaults when none is given.
    pub fn load() -> Result<Self> {
        match std::env::args().nth(1) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }
}
