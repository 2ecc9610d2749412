//! Spanning forest computation used to break forwarding loops.
//!
//! This is Kruskal's algorithm over an unweighted multigraph. Links are
//! visited in link id order so the same graph always yields the same forest;
//! any link that would close a cycle is left out. Parallel links and
//! self-loops need no special casing: the second link between two already
//! joined nodes (or a link from a node to itself) is simply never selected.

use crate::types::{Link, LinkId, NodeId};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Structural violation found by [`SpanningForest::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForestError {
    #[error("tree {tree} has {links} links for {nodes} nodes")]
    EdgeCount {
        tree: usize,
        nodes: usize,
        links: usize,
    },

    #[error("link {0} closes a cycle")]
    Cycle(LinkId),

    #[error("link {0} has an endpoint outside its tree")]
    ForeignEndpoint(LinkId),

    #[error("node {0} appears in more than one tree")]
    SharedNode(NodeId),
}

/// Disjoint-set over dense indices, union by rank with path halving.
#[derive(Debug, Clone)]
pub(crate) struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub(crate) fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Joins the sets of `a` and `b`. Returns false if they were already joined.
    pub(crate) fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }
}

/// Spanning tree of one connected component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanningTree {
    nodes: BTreeSet<NodeId>,
    links: Vec<Link>,
}

impl SpanningTree {
    /// Nodes of the component.
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    /// Links selected for this component, in link id order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }
}

/// One spanning tree per connected component of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanningForest {
    trees: Vec<SpanningTree>,
}

impl SpanningForest {
    /// Computes the spanning forest of the graph formed by `links`.
    pub fn compute(links: &[Link]) -> Self {
        let mut ordered: Vec<&Link> = links.iter().collect();
        ordered.sort_by(|a, b| a.link_id.cmp(&b.link_id));
        ordered.dedup_by(|a, b| a.link_id == b.link_id);

        let mut index: BTreeMap<&NodeId, usize> = BTreeMap::new();
        for link in &ordered {
            for node in [&link.source_node, &link.dest_node] {
                let next = index.len();
                index.entry(node).or_insert(next);
            }
        }

        let mut sets = DisjointSet::new(index.len());
        let mut selected = Vec::new();
        for link in ordered {
            let a = index[&link.source_node];
            let b = index[&link.dest_node];
            if sets.union(a, b) {
                selected.push(link);
            }
        }

        // Group by component root; BTreeMap iteration keeps trees ordered by
        // their smallest node id.
        let mut tree_of_root: BTreeMap<usize, usize> = BTreeMap::new();
        let mut trees: Vec<SpanningTree> = Vec::new();
        for (node, &i) in &index {
            let root = sets.find(i);
            let slot = *tree_of_root.entry(root).or_insert_with(|| {
                trees.push(SpanningTree::default());
                trees.len() - 1
            });
            trees[slot].nodes.insert((*node).clone());
        }
        for link in selected {
            let root = sets.find(index[&link.source_node]);
            trees[tree_of_root[&root]].links.push(link.clone());
        }

        Self { trees }
    }

    /// Trees of the forest, one per connected component.
    pub fn trees(&self) -> &[SpanningTree] {
        &self.trees
    }

    /// All selected links across every tree.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.trees.iter().flat_map(|t| t.links.iter())
    }

    /// Number of selected links.
    pub fn link_count(&self) -> usize {
        self.trees.iter().map(|t| t.links.len()).sum()
    }

    /// Returns true if the link with this id was selected.
    pub fn contains(&self, link_id: &LinkId) -> bool {
        self.links().any(|l| &l.link_id == link_id)
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Checks the forest invariants: every tree is acyclic, has exactly
    /// `nodes - 1` links whose endpoints are its own nodes, and no node
    /// belongs to two trees.
    pub fn verify(&self) -> Result<(), ForestError> {
        let mut seen: BTreeSet<&NodeId> = BTreeSet::new();

        for (i, tree) in self.trees.iter().enumerate() {
            if tree.links.len() + 1 != tree.nodes.len() {
                return Err(ForestError::EdgeCount {
                    tree: i,
                    nodes: tree.nodes.len(),
                    links: tree.links.len(),
                });
            }

            let index: BTreeMap<&NodeId, usize> =
                tree.nodes.iter().enumerate().map(|(i, n)| (n, i)).collect();
            let mut sets = DisjointSet::new(index.len());
            for link in &tree.links {
                let (Some(&a), Some(&b)) = (index.get(&link.source_node), index.get(&link.dest_node))
                else {
                    return Err(ForestError::ForeignEndpoint(link.link_id.clone()));
                };
                if !sets.union(a, b) {
                    return Err(ForestError::Cycle(link.link_id.clone()));
                }
            }

            for node in &tree.nodes {
                if !seen.insert(node) {
                    return Err(ForestError::SharedNode(node.clone()));
                }
            }
        }

        Ok(())
    }
}
