//! # loopremoverd - Loop-Prevention Topology Daemon
//!
//! Keeps an L2 fabric free of flooding loops. The daemon tracks the links
//! reported by topology discovery, computes a spanning forest over them and
//! marks every switch port as forwarding or discarding, so that flood traffic
//! only ever follows tree links.
//!
//! ## Responsibilities
//! - In-memory multigraph of topology links ([`LinkGraph`])
//! - Spanning forest computation used only to break cycles ([`SpanningForest`])
//! - Per-port status derivation ([`PortStatusResolver`])
//! - Debounced refresh of bursts of link events ([`TopologyEventProcessor`])
//! - Transactional persistence of port status ([`PersistentStateWriter`])
//!
//! ## Tables
//! - `TOPOLOGY_LINK_TABLE` (APPL_DB): links per topology instance
//! - `PORT_LOOP_STATUS_TABLE` (STATE_DB): status per node/port
//!
//! ## Example
//! ```no_run
//! use sonic_loopremoverd::{Link, LoopRemover, LoopRemoverConfig, MemoryPortStatusStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> sonic_loopremoverd::Result<()> {
//! let store = Arc::new(MemoryPortStatusStore::new());
//! let engine = LoopRemover::new(&LoopRemoverConfig::default(), store);
//! engine.on_link_event(
//!     vec![Link::new("l1", "openflow:1", "openflow:1:1", "openflow:2", "openflow:2:1")],
//!     vec![],
//! )?;
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod graph;
pub mod port_status;
pub mod processor;
pub mod spanning_tree;
pub mod store;
pub mod tables;
pub mod types;
pub mod writer;

pub use config::LoopRemoverConfig;
pub use engine::LoopRemover;
pub use error::{LoopRemoverError, Result, StoreError};
pub use feed::RedisLinkFeed;
pub use graph::{GraphSnapshot, LinkGraph};
pub use port_status::{PortStatusMap, PortStatusResolver};
pub use processor::{ProcessorConfig, ProcessorState, ProcessorStats, TopologyEventProcessor};
pub use spanning_tree::{ForestError, SpanningForest, SpanningTree};
pub use store::{ApplyOutcome, MemoryPortStatusStore, PortStatusStore, RedisPortStatusStore};
pub use types::*;
pub use writer::{PersistentStateWriter, RetryPolicy, WriteReport};
