//! redb table definitions for the catalog store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Monitored nodes keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Raw health-check results keyed by `{node_id}:{timestamp:020}`.
///
/// The zero-padded timestamp keeps a node's entries in chronological
/// order under a plain lexicographic range scan.
pub const HEALTH_LOG: TableDefinition<&str, &[u8]> = TableDefinition::new("health_log");
