//! Loop remover engine.
//!
//! Ties the link graph, the refresh worker and the store writer together and
//! exposes the operations used by the topology feed and by diagnostics.

use crate::config::LoopRemoverConfig;
use crate::error::Result;
use crate::graph::LinkGraph;
use crate::processor::{ProcessorConfig, ProcessorState, ProcessorStats, TopologyEventProcessor};
use crate::store::PortStatusStore;
use crate::types::{Link, LinkEvent};
use crate::writer::{PersistentStateWriter, RetryPolicy};
use std::sync::Arc;
use tracing::info;

/// Loop-prevention engine for one topology instance.
pub struct LoopRemover {
    topology_id: String,
    graph: Arc<LinkGraph>,
    processor: TopologyEventProcessor,
}

impl LoopRemover {
    /// Builds the engine from daemon configuration and starts its worker.
    pub fn new(config: &LoopRemoverConfig, store: Arc<dyn PortStatusStore>) -> Self {
        Self::with_parts(
            config.topology.topology_id.clone(),
            ProcessorConfig::from(config),
            store,
            config.retry_policy(),
        )
    }

    /// Builds the engine from individual settings.
    pub fn with_parts(
        topology_id: impl Into<String>,
        processor_config: ProcessorConfig,
        store: Arc<dyn PortStatusStore>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let topology_id = topology_id.into();
        let graph = Arc::new(LinkGraph::new());
        let writer = PersistentStateWriter::new(store, retry_policy);

        info!(
            topology_id,
            delay_ms = processor_config.refresh_delay.as_millis() as u64,
            "Starting loop remover"
        );
        let processor = TopologyEventProcessor::spawn(processor_config, Arc::clone(&graph), writer);

        Self {
            topology_id,
            graph,
            processor,
        }
    }

    pub fn topology_id(&self) -> &str {
        &self.topology_id
    }

    /// Reports links created and removed in the topology.
    ///
    /// Returns immediately; the change is applied by the next refresh.
    pub fn on_link_event(&self, created: Vec<Link>, removed: Vec<Link>) -> Result<()> {
        self.processor.submit(LinkEvent::new(created, removed))
    }

    /// Schedules a refresh with no topology change. The first refresh
    /// discards ports still recorded Forwarding that no known link
    /// terminates.
    pub fn request_refresh(&self) -> Result<()> {
        self.processor.request_refresh()
    }

    /// Every link currently in the graph.
    pub fn all_links(&self) -> Vec<Link> {
        self.graph.all_links()
    }

    /// Links selected by the spanning forest of the current graph.
    pub fn links_in_mst(&self) -> Vec<Link> {
        self.graph.links_in_mst()
    }

    pub fn state(&self) -> ProcessorState {
        self.processor.state()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.processor.stats()
    }

    /// Stops the refresh worker. A commit in flight completes first.
    pub async fn shutdown(&self) {
        self.processor.shutdown().await;
        info!(topology_id = %self.topology_id, "Loop remover stopped");
    }
}
