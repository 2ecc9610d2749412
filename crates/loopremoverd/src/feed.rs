//! Topology change feed.
//!
//! Topology discovery publishes links into the APPL_DB link table. The feed
//! polls that table for one topology instance and turns the difference
//! between consecutive snapshots into link events.

use crate::engine::LoopRemover;
use crate::error::Result;
use crate::tables::{escape_glob, fields, topology_link_prefix};
use crate::types::{Link, LinkEvent, LinkId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Links of one topology keyed by id.
pub type LinkSnapshot = BTreeMap<LinkId, Link>;

/// Builds a link from a table entry. Returns None if a field is missing.
pub fn parse_link(link_id: &str, values: &HashMap<String, String>) -> Option<Link> {
    let field = |name: &str| values.get(name).filter(|v| !v.is_empty()).cloned();
    Some(Link::new(
        link_id,
        field(fields::SOURCE_NODE)?,
        field(fields::SOURCE_PORT)?,
        field(fields::DEST_NODE)?,
        field(fields::DEST_PORT)?,
    ))
}

/// Computes the event that turns `previous` into `current`.
///
/// A link whose id is kept but whose endpoints changed is reported as
/// removed (old endpoints) and created (new endpoints).
pub fn diff_snapshots(previous: &LinkSnapshot, current: &LinkSnapshot) -> LinkEvent {
    let mut event = LinkEvent::default();

    for (id, link) in current {
        match previous.get(id) {
            Some(old) if old == link => {}
            Some(old) => {
                event.removed.push(old.clone());
                event.created.push(link.clone());
            }
            None => event.created.push(link.clone()),
        }
    }
    for (id, old) in previous {
        if !current.contains_key(id) {
            event.removed.push(old.clone());
        }
    }

    event
}

/// Polling reader of the APPL_DB topology link table.
pub struct RedisLinkFeed {
    conn: ConnectionManager,
    prefix: String,
    poll_interval: Duration,
    last: LinkSnapshot,
}

impl RedisLinkFeed {
    /// Connects to `db` and watches links of `topology_id`.
    pub async fn connect(
        host: &str,
        port: u16,
        db: i64,
        topology_id: &str,
        poll_interval: Duration,
    ) -> Result<Self> {
        let url = format!("redis://{}:{}/{}", host, port, db);
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(host, port, db, topology_id, "Connected topology feed");

        Ok(Self {
            conn,
            prefix: topology_link_prefix(topology_id),
            poll_interval,
            last: LinkSnapshot::new(),
        })
    }

    /// Reads every link of the topology.
    #[instrument(skip(self), fields(prefix = %self.prefix))]
    pub async fn fetch_links(&mut self) -> Result<LinkSnapshot> {
        let pattern = format!("{}*", escape_glob(&self.prefix));
        let keys: Vec<String> = self.conn.keys(&pattern).await?;

        let mut snapshot = LinkSnapshot::new();
        for key in keys {
            let Some(link_id) = key.strip_prefix(&self.prefix) else {
                continue;
            };
            let values: HashMap<String, String> = self.conn.hgetall(&key).await?;
            match parse_link(link_id, &values) {
                Some(link) => {
                    snapshot.insert(link.link_id.clone(), link);
                }
                None => warn!(key, "Skipping incomplete topology link entry"),
            }
        }
        Ok(snapshot)
    }

    /// Fetches the table and returns the change since the previous poll.
    /// The first poll reports every link as created.
    pub async fn poll(&mut self) -> Result<LinkEvent> {
        let current = self.fetch_links().await?;
        let event = diff_snapshots(&self.last, &current);
        self.last = current;
        Ok(event)
    }

    /// Feeds changes into `engine` until `cancel` fires.
    ///
    /// Poll failures are logged and retried on the next tick; the previous
    /// snapshot is kept so nothing is lost.
    pub async fn run(mut self, engine: &LoopRemover, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(prefix = %self.prefix, "Topology feed started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll().await {
                Ok(event) if event.is_empty() => {}
                Ok(event) => {
                    info!(
                        created = event.created.len(),
                        removed = event.removed.len(),
                        "Topology changed"
                    );
                    if let Err(e) = engine.on_link_event(event.created, event.removed) {
                        warn!(error = %e, "Loop remover rejected link event");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to poll topology links"),
            }
        }

        info!("Topology feed stopped");
    }
}
