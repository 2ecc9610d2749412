//! In-process store used by tests and dry runs.

use super::{ApplyOutcome, PortStatusStore};
use crate::error::StoreError;
use crate::port_status::PortStatusMap;
use crate::types::{PortRef, PortStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryInner {
    records: PortStatusMap,
    failures: VecDeque<StoreError>,
    applies: usize,
    writes: usize,
    latency: Option<Duration>,
}

/// Port status store backed by a map.
///
/// Failures can be queued with [`fail_next`](Self::fail_next); each queued
/// error fails one apply without touching the records.
#[derive(Debug, Default)]
pub struct MemoryPortStatusStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryPortStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` applies with `error`.
    pub fn fail_next(&self, count: usize, error: StoreError) {
        let mut inner = self.inner.lock();
        inner
            .failures
            .extend(std::iter::repeat(error).take(count));
    }

    /// Makes every apply wait `latency` before committing.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = Some(latency);
    }

    /// Copy of every stored record.
    pub fn records(&self) -> PortStatusMap {
        self.inner.lock().records.clone()
    }

    /// Number of apply calls, including failed ones.
    pub fn apply_count(&self) -> usize {
        self.inner.lock().applies
    }

    /// Number of records written across all applies.
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }
}

#[async_trait]
impl PortStatusStore for MemoryPortStatusStore {
    async fn apply_port_statuses(
        &self,
        desired: &PortStatusMap,
    ) -> Result<ApplyOutcome, StoreError> {
        let latency = self.inner.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock();
        inner.applies += 1;
        if let Some(err) = inner.failures.pop_front() {
            return Err(err);
        }

        let changed: Vec<(PortRef, PortStatus)> = desired
            .iter()
            .filter(|(port, status)| inner.records.get(*port) != Some(*status))
            .map(|(port, status)| (port.clone(), *status))
            .collect();
        let written = changed.len();
        inner.records.extend(changed);
        inner.writes += written;

        Ok(ApplyOutcome {
            examined: desired.len(),
            written,
        })
    }

    async fn port_status(&self, port: &PortRef) -> Result<Option<PortStatus>, StoreError> {
        Ok(self.inner.lock().records.get(port).copied())
    }

    async fn recorded_statuses(&self) -> Result<PortStatusMap, StoreError> {
        Ok(self.records())
    }
}
