//! Instance model: the unit of registration tracked by the directory

use crate::arg::ArgRegister;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Instance is ready to receive traffic.
pub const STATUS_UP: u32 = 1;
/// Instance is registered but held out of rotation.
pub const STATUS_WAITING: u32 = 1 << 1;
/// Bitmask matching every status, for unfiltered fetches.
pub const STATUS_ALL: u32 = STATUS_UP | STATUS_WAITING;

/// Current Unix time in nanoseconds, the resolution used by every
/// timestamp in the data model.
pub fn now_nanos() -> i64 {
    // timestamp_nanos_opt only fails past the year 2262
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Mutation kind fanned out to peers during replication.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Register,
    Renew,
    Cancel,
}

/// One running copy of a service. Identity key is (appid, hostname).
///
/// `dirty_timestamp` is a logical write-version used purely for conflict
/// resolution between replicated writes; `renew_timestamp` and
/// `latest_timestamp` track renewal liveness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub zone: String,
    pub env: String,
    pub appid: String,
    pub hostname: String,
    #[serde(default)]
    pub addrs: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub status: u32,
    #[serde(default)]
    pub reg_timestamp: i64,
    #[serde(default)]
    pub up_timestamp: i64,
    #[serde(default)]
    pub renew_timestamp: i64,
    #[serde(default)]
    pub dirty_timestamp: i64,
    #[serde(default)]
    pub latest_timestamp: i64,
}

impl Instance {
    /// Build a fresh instance from a register bundle. Clocks are reset to
    /// now unless the bundle carries explicit values, which replication
    /// does so that write-versions stay aligned across peers.
    pub fn from_register(arg: &ArgRegister) -> Self {
        let now = now_nanos();
        Instance {
            zone: arg.zone.clone(),
            env: arg.env.clone(),
            appid: arg.appid.clone(),
            hostname: arg.hostname.clone(),
            addrs: arg.addrs.clone(),
            version: arg.version.clone(),
            metadata: arg.metadata.clone(),
            status: arg.status,
            reg_timestamp: now,
            up_timestamp: now,
            renew_timestamp: now,
            dirty_timestamp: if arg.dirty_timestamp > 0 {
                arg.dirty_timestamp
            } else {
                now
            },
            latest_timestamp: if arg.latest_timestamp > 0 {
                arg.latest_timestamp
            } else {
                now
            },
        }
    }

    /// Whether this instance passes a bitmask status filter.
    pub fn filter_status(&self, status: u32) -> bool {
        self.status & status > 0
    }

    /// Refresh the renewal liveness clocks. The dirty timestamp is
    /// deliberately untouched: renewal is not a write-version change.
    pub fn renew(&mut self, now: i64) {
        self.renew_timestamp = now;
        self.latest_timestamp = now;
    }
}

/// Per-appid view returned to readers: instances grouped by zone in
/// deterministic order, plus the version marker enabling NotModified
/// comparisons on fetch and long-poll.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub instances: BTreeMap<String, Vec<Instance>>,
    pub latest_timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(status: u32) -> Instance {
        Instance {
            zone: "sh001".to_string(),
            env: "prod".to_string(),
            appid: "svc.account".to_string(),
            hostname: "host-1".to_string(),
            addrs: vec!["http://10.0.0.1:8000".to_string()],
            version: "1".to_string(),
            metadata: HashMap::new(),
            status,
            reg_timestamp: 0,
            up_timestamp: 0,
            renew_timestamp: 0,
            dirty_timestamp: 0,
            latest_timestamp: 0,
        }
    }

    #[test]
    fn test_filter_status() {
        assert!(instance(STATUS_UP).filter_status(STATUS_UP));
        assert!(instance(STATUS_UP).filter_status(STATUS_ALL));
        assert!(!instance(STATUS_WAITING).filter_status(STATUS_UP));
        assert!(instance(STATUS_WAITING).filter_status(STATUS_ALL));
    }

    #[test]
    fn test_renew_leaves_dirty_untouched() {
        let mut ins = instance(STATUS_UP);
        ins.dirty_timestamp = 42;
        ins.renew(100);
        assert_eq!(ins.renew_timestamp, 100);
        assert_eq!(ins.latest_timestamp, 100);
        assert_eq!(ins.dirty_timestamp, 42);
    }

    #[test]
    fn test_now_nanos_monotonic_enough() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(b >= a);
    }
}
