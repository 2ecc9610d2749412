//! Topology types shared by the graph, resolver and store layers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a switch/datapath (e.g. "openflow:1").
    NodeId
);

string_id!(
    /// Identifier of a termination point on a node (e.g. "openflow:1:2").
    PortId
);

string_id!(
    /// Identifier of a topology link.
    LinkId
);

/// A (node, port) pair. This is the key of a status record in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: PortId,
}

impl PortRef {
    /// Creates a new port reference.
    pub fn new(node: impl Into<NodeId>, port: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }

    /// Returns the store key for this port ("node|port").
    pub fn store_key(&self) -> String {
        format!("{}|{}", self.node, self.port)
    }

    /// Parses a "node|port" store key. Node ids never contain '|'.
    pub fn from_store_key(key: &str) -> Option<Self> {
        let (node, port) = key.split_once('|')?;
        if node.is_empty() || port.is_empty() {
            return None;
        }
        Some(Self::new(node, port))
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.port)
    }
}

/// A link between two node/port pairs, treated as one undirected edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub link_id: LinkId,
    pub source_node: NodeId,
    pub source_port: PortId,
    pub dest_node: NodeId,
    pub dest_port: PortId,
}

impl Link {
    /// Creates a new link.
    pub fn new(
        link_id: impl Into<LinkId>,
        source_node: impl Into<NodeId>,
        source_port: impl Into<PortId>,
        dest_node: impl Into<NodeId>,
        dest_port: impl Into<PortId>,
    ) -> Self {
        Self {
            link_id: link_id.into(),
            source_node: source_node.into(),
            source_port: source_port.into(),
            dest_node: dest_node.into(),
            dest_port: dest_port.into(),
        }
    }

    /// Source endpoint.
    pub fn source(&self) -> PortRef {
        PortRef::new(self.source_node.clone(), self.source_port.clone())
    }

    /// Destination endpoint.
    pub fn destination(&self) -> PortRef {
        PortRef::new(self.dest_node.clone(), self.dest_port.clone())
    }

    /// Both endpoints, source first.
    pub fn endpoints(&self) -> [PortRef; 2] {
        [self.source(), self.destination()]
    }

    /// Returns true if both ends sit on the same node.
    pub fn is_self_loop(&self) -> bool {
        self.source_node == self.dest_node
    }

    /// Returns true if this link attaches a host rather than another switch.
    ///
    /// Host links are identified by a marker substring in the link id.
    pub fn is_host_link(&self, marker: &str) -> bool {
        !marker.is_empty() && self.link_id.as_str().contains(marker)
    }

    /// Direction-independent key of the physical connection.
    ///
    /// Discovery reports A:1->B:1 and B:1->A:1 as two links; both map to the
    /// same key.
    pub fn physical_key(&self) -> (PortRef, PortRef) {
        let (a, b) = (self.source(), self.destination());
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} <-> {}/{})",
            self.link_id, self.source_node, self.source_port, self.dest_node, self.dest_port
        )
    }
}

/// Loop-prevention status of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    /// Flood traffic may egress the port.
    Forwarding,
    /// Flood traffic must not egress the port.
    Discarding,
}

impl PortStatus {
    /// Parses a status from its store representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "forwarding" => Some(Self::Forwarding),
            "discarding" => Some(Self::Discarding),
            _ => None,
        }
    }

    /// Converts to the store representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forwarding => "forwarding",
            Self::Discarding => "discarding",
        }
    }

    pub fn is_forwarding(&self) -> bool {
        matches!(self, Self::Forwarding)
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of link changes delivered by the topology feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkEvent {
    pub created: Vec<Link>,
    pub removed: Vec<Link>,
}

impl LinkEvent {
    /// Creates a new event.
    pub fn new(created: Vec<Link>, removed: Vec<Link>) -> Self {
        Self { created, removed }
    }

    /// Returns true if the event carries no links.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.removed.is_empty()
    }

    /// Total number of links carried.
    pub fn len(&self) -> usize {
        self.created.len() + self.removed.len()
    }

    /// Drops host links from both lists.
    pub fn without_host_links(mut self, marker: &str) -> Self {
        self.created.retain(|l| !l.is_host_link(marker));
        self.removed.retain(|l| !l.is_host_link(marker));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_status_parse() {
        assert_eq!(PortStatus::parse("forwarding"), Some(PortStatus::Forwarding));
        assert_eq!(PortStatus::parse("discarding"), Some(PortStatus::Discarding));
        assert_eq!(PortStatus::parse("blocking"), None);
        assert_eq!(PortStatus::Discarding.as_str(), "discarding");
        assert!(PortStatus::Forwarding.is_forwarding());
    }

    #[test]
    fn test_physical_key_ignores_direction() {
        let forward = Link::new("l1", "openflow:1", "openflow:1:1", "openflow:2", "openflow:2:1");
        let reverse = Link::new("l2", "openflow:2", "openflow:2:1", "openflow:1", "openflow:1:1");

        assert_eq!(forward.physical_key(), reverse.physical_key());
        assert_ne!(forward.link_id, reverse.link_id);
    }

    #[test]
    fn test_host_link_marker() {
        let host = Link::new("host:00:11:22/openflow:1:3", "host:1", "host:1:0", "openflow:1", "openflow:1:3");
        let switch = Link::new("openflow:1:1", "openflow:1", "openflow:1:1", "openflow:2", "openflow:2:1");

        assert!(host.is_host_link("host"));
        assert!(!switch.is_host_link("host"));
        assert!(!host.is_host_link(""));

        let event = LinkEvent::new(vec![host, switch.clone()], vec![]).without_host_links("host");
        assert_eq!(event.created, vec![switch]);
        assert_eq!(event.len(), 1);
    }

    #[test]
    fn test_store_key() {
        let port = PortRef::new("openflow:1", "openflow:1:2");
        assert_eq!(port.store_key(), "openflow:1|openflow:1:2");
        assert_eq!(port.to_string(), "openflow:1/openflow:1:2");
        assert_eq!(PortRef::from_store_key(&port.store_key()), Some(port));
        assert_eq!(PortRef::from_store_key("openflow:1"), None);
        assert_eq!(PortRef::from_store_key("|openflow:1:2"), None);
    }

    #[test]
    fn test_self_loop() {
        let link = Link::new("l", "n1", "p1", "n1", "p2");
        assert!(link.is_self_loop());
    }
}
