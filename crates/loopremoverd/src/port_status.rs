//! Port status resolution.
//!
//! A port forwards flood traffic only if every physical link it terminates is
//! part of the spanning forest. Discovery reports each physical link once per
//! direction under two link ids, so links are grouped by their unordered port
//! pair: if either direction was selected, the physical link is active.

use crate::spanning_tree::SpanningForest;
use crate::types::{Link, PortRef, PortStatus};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Desired status per port, ordered by port.
pub type PortStatusMap = BTreeMap<PortRef, PortStatus>;

/// Derives per-port status from a link set and its spanning forest.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortStatusResolver;

impl PortStatusResolver {
    pub fn new() -> Self {
        Self
    }

    /// Classifies every endpoint of `links`.
    ///
    /// Ports that terminate no link are absent from the result. A port that
    /// terminates both an active and an inactive physical link is Discarding.
    pub fn resolve(&self, links: &[Link], forest: &SpanningForest) -> PortStatusMap {
        let active: BTreeSet<(PortRef, PortRef)> =
            forest.links().map(Link::physical_key).collect();

        let mut statuses = PortStatusMap::new();
        for link in links {
            let status = if active.contains(&link.physical_key()) {
                PortStatus::Forwarding
            } else {
                PortStatus::Discarding
            };
            for port in link.endpoints() {
                statuses
                    .entry(port)
                    .and_modify(|current| {
                        if status == PortStatus::Discarding {
                            *current = PortStatus::Discarding;
                        }
                    })
                    .or_insert(status);
            }
        }

        debug!(
            ports = statuses.len(),
            discarding = statuses.values().filter(|s| !s.is_forwarding()).count(),
            "Resolved port statuses"
        );
        statuses
    }

    /// Adds Discarding for every forced port that the resolution no longer
    /// covers. Ports still terminating a link keep their resolved status.
    pub fn with_forced_discards(
        &self,
        mut statuses: PortStatusMap,
        forced: &BTreeSet<PortRef>,
    ) -> PortStatusMap {
        for port in forced {
            statuses
                .entry(port.clone())
                .or_insert(PortStatus::Discarding);
        }
        statuses
    }
}

/// Links whose two endpoints both forward.
pub fn forwarding_links<'a>(links: &'a [Link], statuses: &PortStatusMap) -> Vec<&'a Link> {
    let forwards = |port: &PortRef| {
        statuses
            .get(port)
            .map_or(true, |status| status.is_forwarding())
    };
    links
        .iter()
        .filter(|link| link.endpoints().iter().all(forwards))
        .collect()
}
