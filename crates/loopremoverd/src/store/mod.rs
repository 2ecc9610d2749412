//! Operational state store for port status records.
//!
//! The store is the only outbound dependency of the engine. Implementations
//! must apply a whole batch atomically: either every differing record is
//! written or none is.

mod memory;
mod redis_store;

pub use self::memory::MemoryPortStatusStore;
pub use self::redis_store::RedisPortStatusStore;

use crate::error::StoreError;
use crate::port_status::PortStatusMap;
use crate::types::{PortRef, PortStatus};
use async_trait::async_trait;

/// Result of one atomic apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Records compared against the desired status.
    pub examined: usize,
    /// Records created or updated.
    pub written: usize,
}

/// Port status persistence.
#[async_trait]
pub trait PortStatusStore: Send + Sync {
    /// Compares each desired status against the stored record and writes
    /// only those that differ, creating absent records. The read, compare
    /// and write happen as one transaction.
    async fn apply_port_statuses(&self, desired: &PortStatusMap)
        -> Result<ApplyOutcome, StoreError>;

    /// Reads the recorded status of one port.
    async fn port_status(&self, port: &PortRef) -> Result<Option<PortStatus>, StoreError>;

    /// Reads every recorded status. Used to reconcile after a restart.
    async fn recorded_statuses(&self) -> Result<PortStatusMap, StoreError>;
}
