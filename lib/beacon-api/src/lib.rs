//! Beacon API types shared across the registry, cluster, and transport
//!
//! This library defines the wire-level data model:
//! - Instance: one running copy of a service, keyed by (appid, hostname)
//! - InstanceInfo: the per-appid view returned to readers
//! - NodeDesc: descriptor of a peer cluster member
//! - Argument bundles for every registry operation

pub mod arg;
pub mod instance;
pub mod node;

pub use arg::{ArgCancel, ArgFetch, ArgFetchs, ArgPolls, ArgRegister, ArgRenew};
pub use instance::{now_nanos, Action, Instance, InstanceInfo, STATUS_ALL, STATUS_UP, STATUS_WAITING};
pub use node::{NodeDesc, NodeStatus};
