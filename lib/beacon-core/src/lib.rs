//! Core registry functionality
//!
//! This library provides:
//! - The sharded in-memory instance directory with per-shard locking
//! - Logical-clock conflict resolution for replicated renewals
//! - Long-poll waiter registration and change notification
//! - The notify-handle reuse pool

pub mod error;
pub mod poll;
pub mod registry;

pub use error::{CoreError, Result};
pub use poll::{NotifyHandle, PollResult};
pub use registry::Registry;
