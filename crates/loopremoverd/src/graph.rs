//! In-memory link graph.
//!
//! `LinkGraph` is an undirected multigraph kept as an adjacency list: every
//! node maps to the ids of the links touching it, and links are stored once by
//! id. All access goes through one coarse lock; readers get owned copies so a
//! refresh in progress can never be observed half applied.

use crate::spanning_tree::SpanningForest;
use crate::types::{Link, LinkId, NodeId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct GraphInner {
    links: BTreeMap<LinkId, Link>,
    adjacency: BTreeMap<NodeId, BTreeSet<LinkId>>,
    /// Forest of the current edge set; dropped on every mutation.
    forest: Option<Arc<SpanningForest>>,
}

impl GraphInner {
    fn attach(&mut self, node: &NodeId, link_id: &LinkId) {
        self.adjacency
            .entry(node.clone())
            .or_default()
            .insert(link_id.clone());
    }

    fn detach(&mut self, node: &NodeId, link_id: &LinkId) {
        if let Some(ids) = self.adjacency.get_mut(node) {
            ids.remove(link_id);
            if ids.is_empty() {
                self.adjacency.remove(node);
            }
        }
    }

    fn forest(&mut self) -> Arc<SpanningForest> {
        if let Some(forest) = &self.forest {
            return Arc::clone(forest);
        }
        let links: Vec<Link> = self.links.values().cloned().collect();
        let forest = Arc::new(SpanningForest::compute(&links));
        debug_assert!(
            forest.verify().is_ok(),
            "spanning forest invariant broken: {:?}",
            forest.verify()
        );
        self.forest = Some(Arc::clone(&forest));
        forest
    }
}

/// Consistent view of the edge set and its spanning forest.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub links: Vec<Link>,
    pub forest: Arc<SpanningForest>,
}

/// Thread-safe undirected multigraph of topology links.
#[derive(Debug, Default)]
pub struct LinkGraph {
    inner: Mutex<GraphInner>,
}

impl LinkGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds links to the graph, creating their endpoint nodes as needed.
    ///
    /// A link id that is already present is skipped. Distinct ids between the
    /// same nodes become parallel edges. Returns the number of links added.
    pub fn add_links(&self, links: &[Link]) -> usize {
        if links.is_empty() {
            info!("add_links: no link added, input is empty");
            return 0;
        }

        let mut inner = self.inner.lock();
        let mut added = 0;
        for link in links {
            if inner.links.contains_key(&link.link_id) {
                debug!(link_id = %link.link_id, "Link already in graph");
                continue;
            }
            inner.attach(&link.source_node, &link.link_id);
            inner.attach(&link.dest_node, &link.link_id);
            inner.links.insert(link.link_id.clone(), link.clone());
            added += 1;
        }

        if added > 0 {
            inner.forest = None;
        }
        added
    }

    /// Removes links by id. Unknown ids are ignored, and nodes left without
    /// any link leave the graph. Returns the number of links removed.
    pub fn remove_links(&self, links: &[Link]) -> usize {
        if links.is_empty() {
            info!("remove_links: no link removed, input is empty");
            return 0;
        }

        let mut inner = self.inner.lock();
        let mut removed = 0;
        for link in links {
            let Some(stored) = inner.links.remove(&link.link_id) else {
                debug!(link_id = %link.link_id, "Link not in graph");
                continue;
            };
            inner.detach(&stored.source_node, &stored.link_id);
            inner.detach(&stored.dest_node, &stored.link_id);
            removed += 1;
        }

        if removed > 0 {
            inner.forest = None;
        }
        removed
    }

    /// Returns every link, ordered by id.
    pub fn all_links(&self) -> Vec<Link> {
        self.inner.lock().links.values().cloned().collect()
    }

    /// Returns the links of the spanning forest of the current graph.
    pub fn links_in_mst(&self) -> Vec<Link> {
        self.spanning_forest().links().cloned().collect()
    }

    /// Returns the spanning forest, computing it if the graph changed since
    /// the last call.
    pub fn spanning_forest(&self) -> Arc<SpanningForest> {
        self.inner.lock().forest()
    }

    /// Returns the edge set together with its forest, taken under one lock.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut inner = self.inner.lock();
        let forest = inner.forest();
        GraphSnapshot {
            links: inner.links.values().cloned().collect(),
            forest,
        }
    }

    /// Resets the graph to empty.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        *inner = GraphInner::default();
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().adjacency.len()
    }

    pub fn link_count(&self) -> usize {
        self.inner.lock().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().links.is_empty()
    }

    pub fn contains_link(&self, link_id: &LinkId) -> bool {
        self.inner.lock().links.contains_key(link_id)
    }
}
