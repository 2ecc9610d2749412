//! Table name constants for loopremoverd

/// APPL_DB table holding discovered topology links.
///
/// Keys are `TOPOLOGY_LINK_TABLE:<topology_id>|<link_id>`.
pub const APP_TOPOLOGY_LINK_TABLE_NAME: &str = "TOPOLOGY_LINK_TABLE";

/// STATE_DB table holding per-port loop-prevention status.
///
/// Keys are `PORT_LOOP_STATUS_TABLE|<node>|<port>`.
pub const STATE_PORT_LOOP_STATUS_TABLE_NAME: &str = "PORT_LOOP_STATUS_TABLE";

/// Separator between table name and key in APPL_DB.
pub const APPL_DB_SEPARATOR: &str = ":";

/// Separator between table name and key in STATE_DB.
pub const STATE_DB_SEPARATOR: &str = "|";

/// Field names used in topology tables
pub mod fields {
    pub const SOURCE_NODE: &str = "source_node";
    pub const SOURCE_PORT: &str = "source_port";
    pub const DEST_NODE: &str = "dest_node";
    pub const DEST_PORT: &str = "dest_port";
    pub const STATUS: &str = "status";
}

/// Special constants
pub mod constants {
    /// Default topology instance
    pub const DEFAULT_TOPOLOGY_ID: &str = "flow:1";

    /// Default marker identifying host attachment links
    pub const DEFAULT_HOST_LINK_MARKER: &str = "host";
}

/// Prefix shared by every link key of one topology in APPL_DB.
pub fn topology_link_prefix(topology_id: &str) -> String {
    format!("{APP_TOPOLOGY_LINK_TABLE_NAME}{APPL_DB_SEPARATOR}{topology_id}|")
}

/// Full STATE_DB key of a port status record.
pub fn port_status_key(store_key: &str) -> String {
    format!("{STATE_PORT_LOOP_STATUS_TABLE_NAME}{STATE_DB_SEPARATOR}{store_key}")
}

/// Escapes Redis glob metacharacters so `s` matches only itself.
pub fn escape_glob(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `KEYS` pattern matching every port status record.
pub fn port_status_pattern() -> String {
    format!("{STATE_PORT_LOOP_STATUS_TABLE_NAME}{STATE_DB_SEPARATOR}*")
}
