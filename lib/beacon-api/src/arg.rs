//! Request argument bundles for the registry operation surface
//!
//! Every mutating bundle carries a `replication` flag: true means the call
//! originated from a peer node, not an end client, and must not be
//! re-propagated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Arguments for Register.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArgRegister {
    pub zone: String,
    pub env: String,
    pub appid: String,
    pub hostname: String,
    pub status: u32,
    #[serde(default)]
    pub addrs: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub dirty_timestamp: i64,
    #[serde(default)]
    pub latest_timestamp: i64,
    #[serde(default)]
    pub replication: bool,
}

/// Arguments for Renew. `dirty_timestamp` is only meaningful when
/// `replication` is set: it is the sender's write-version, compared against
/// the local one by the conflict-resolution rule.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArgRenew {
    pub zone: String,
    pub env: String,
    pub appid: String,
    pub hostname: String,
    #[serde(default)]
    pub dirty_timestamp: i64,
    #[serde(default)]
    pub replication: bool,
}

/// Arguments for Cancel.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArgCancel {
    pub zone: String,
    pub env: String,
    pub appid: String,
    pub hostname: String,
    #[serde(default)]
    pub latest_timestamp: i64,
    #[serde(default)]
    pub replication: bool,
}

/// Arguments for Fetch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArgFetch {
    pub zone: String,
    pub env: String,
    pub appid: String,
    pub status: u32,
}

/// Arguments for Fetchs (batch fetch).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArgFetchs {
    pub zone: String,
    pub env: String,
    pub appid: Vec<String>,
    pub status: u32,
}

/// Arguments for Polls. `latest_timestamp[i]` is the version of `appid[i]`
/// the caller already holds; missing entries are treated as zero. `hostname`
/// identifies the polling connection for DelConns.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArgPolls {
    pub zone: String,
    pub env: String,
    pub appid: Vec<String>,
    #[serde(default)]
    pub latest_timestamp: Vec<i64>,
    pub hostname: String,
}

impl ArgPolls {
    /// Version the caller holds for the i-th appid, zero when unspecified.
    pub fn known_version(&self, i: usize) -> i64 {
        self.latest_timestamp.get(i).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_version_pads_with_zero() {
        let arg = ArgPolls {
            appid: vec!["a".to_string(), "b".to_string()],
            latest_timestamp: vec![7],
            ..Default::default()
        };
        assert_eq!(arg.known_version(0), 7);
        assert_eq!(arg.known_version(1), 0);
    }

    #[test]
    fn test_replication_defaults_off() {
        let arg: ArgRenew = serde_json::from_str(
            r#"{"zone":"z","env":"prod","appid":"svc","hostname":"h1"}"#,
        )
        .unwrap();
        assert!(!arg.replication);
        assert_eq!(arg.dirty_timestamp, 0);
    }
}
