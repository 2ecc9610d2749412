//! STATE_DB backed port status store.

use super::{ApplyOutcome, PortStatusStore};
use crate::error::StoreError;
use crate::port_status::PortStatusMap;
use crate::tables::{fields, port_status_key, port_status_pattern};
use crate::types::{PortRef, PortStatus};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, instrument, warn};

/// Compares every key against its desired status, then writes the ones that
/// differ. All reads happen before the first write so a type error aborts the
/// script with nothing written.
///
/// KEYS: record keys. ARGV[1]: status field. ARGV[i + 1]: status for KEYS[i].
const APPLY_PORT_STATUSES_SCRIPT: &str = r#"
local changed = {}
for i, key in ipairs(KEYS) do
    if redis.call('HGET', key, ARGV[1]) ~= ARGV[i + 1] then
        table.insert(changed, i)
    end
end
for _, i in ipairs(changed) do
    redis.call('HSET', KEYS[i], ARGV[1], ARGV[i + 1])
end
return #changed
"#;

/// Port status store on a SONiC STATE_DB instance.
#[derive(Clone)]
pub struct RedisPortStatusStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisPortStatusStore {
    /// Connects to `db` on the given Redis server.
    #[instrument(skip_all)]
    pub async fn connect(host: &str, port: u16, db: i64) -> Result<Self, StoreError> {
        let url = format!("redis://{}:{}/{}", host, port, db);
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(host, port, db, "Connected port status store");
        Ok(Self::from_connection(conn))
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(APPLY_PORT_STATUSES_SCRIPT),
        }
    }
}

#[async_trait]
impl PortStatusStore for RedisPortStatusStore {
    #[instrument(skip_all, fields(ports = desired.len()))]
    async fn apply_port_statuses(
        &self,
        desired: &PortStatusMap,
    ) -> Result<ApplyOutcome, StoreError> {
        if desired.is_empty() {
            return Ok(ApplyOutcome::default());
        }

        let mut invocation = self.script.prepare_invoke();
        invocation.arg(fields::STATUS);
        for (port, status) in desired {
            invocation.key(port_status_key(&port.store_key()));
            invocation.arg(status.as_str());
        }

        let mut conn = self.conn.clone();
        let written: usize = invocation.invoke_async(&mut conn).await?;
        debug!(examined = desired.len(), written, "Applied port statuses");

        Ok(ApplyOutcome {
            examined: desired.len(),
            written,
        })
    }

    async fn port_status(&self, port: &PortRef) -> Result<Option<PortStatus>, StoreError> {
        let key = port_status_key(&port.store_key());
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(&key, fields::STATUS).await?;

        match value {
            None => Ok(None),
            Some(raw) => match PortStatus::parse(&raw) {
                Some(status) => Ok(Some(status)),
                None => {
                    warn!(key = key.as_str(), value = raw.as_str(), "Unknown port status in store");
                    Err(StoreError::invalid_reply(format!(
                        "unknown status '{raw}' for {key}"
                    )))
                }
            },
        }
    }

    #[instrument(skip_all)]
    async fn recorded_statuses(&self) -> Result<PortStatusMap, StoreError> {
        let prefix = port_status_key("");
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(port_status_pattern()).await?;

        let mut statuses = PortStatusMap::new();
        for key in keys {
            let Some(port) = key.strip_prefix(&prefix).and_then(PortRef::from_store_key) else {
                warn!(key = key.as_str(), "Skipping malformed port status key");
                continue;
            };
            let value: Option<String> = conn.hget(&key, fields::STATUS).await?;
            match value.as_deref().map(PortStatus::parse) {
                Some(Some(status)) => {
                    statuses.insert(port, status);
                }
                Some(None) => warn!(key = key.as_str(), "Skipping unknown port status in store"),
                None => {}
            }
        }

        debug!(count = statuses.len(), "Read recorded port statuses");
        Ok(statuses)
    }
}
