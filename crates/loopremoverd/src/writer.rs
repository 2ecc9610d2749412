//! Transactional persistence of port statuses.

use crate::error::StoreError;
use crate::port_status::PortStatusMap;
use crate::store::PortStatusStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Bounded retry for store commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Outcome of a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub examined: usize,
    pub written: usize,
    pub attempts: u32,
}

/// Writes one pass worth of port statuses as a single transaction.
pub struct PersistentStateWriter {
    store: Arc<dyn PortStatusStore>,
    policy: RetryPolicy,
}

impl PersistentStateWriter {
    pub fn new(store: Arc<dyn PortStatusStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Reads back every recorded status. Not retried.
    pub async fn recorded_statuses(&self) -> Result<PortStatusMap, StoreError> {
        self.store.recorded_statuses().await
    }

    /// Commits `desired`, writing only records whose stored status differs.
    ///
    /// Retryable failures are retried up to the policy's attempt limit; the
    /// last error is returned if every attempt fails. A failed attempt writes
    /// nothing.
    #[instrument(skip_all, fields(ports = desired.len()))]
    pub async fn write(&self, desired: &PortStatusMap) -> Result<WriteReport, StoreError> {
        if desired.is_empty() {
            debug!("No port status to write");
            return Ok(WriteReport::default());
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.store.apply_port_statuses(desired).await {
                Ok(outcome) => {
                    if outcome.written > 0 {
                        info!(
                            examined = outcome.examined,
                            written = outcome.written,
                            attempt,
                            "Committed port statuses"
                        );
                    } else {
                        debug!(examined = outcome.examined, "Port statuses already up to date");
                    }
                    return Ok(WriteReport {
                        examined: outcome.examined,
                        written: outcome.written,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %err, "Port status commit failed, retrying");
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "Port status commit failed");
                    return Err(err);
                }
            }
        }
    }
}
