//! redb-backed catalog persistence for nodeguard.
//!
//! Provides typed operations over monitored nodes and the raw
//! health-check log. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeguard_core::{HealthCheckResult, MonitoredNode, NodeId};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Default number of raw results retained per node.
pub const DEFAULT_LOG_RETENTION: usize = 500;

/// One persisted health-check result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthLogEntry {
    pub node_id: NodeId,
    pub result: HealthCheckResult,
}

/// Thread-safe catalog store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    log_retention: usize,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            log_retention: DEFAULT_LOG_RETENTION,
        };
        store.ensure_tables()?;
        debug!(?path, "catalog store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            log_retention: DEFAULT_LOG_RETENTION,
        };
        store.ensure_tables()?;
        debug!("in-memory catalog store opened");
        Ok(store)
    }

    /// Cap the number of health-log entries kept per node.
    pub fn with_log_retention(mut self, entries: usize) -> Self {
        self.log_retention = entries.max(1);
        self
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(HEALTH_LOG).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node record.
    pub fn put_node(&self, node: &MonitoredNode) -> StateResult<()> {
        validate_node_id(&node.id)?;
        let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(node.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id = %node.id, "node stored");
        Ok(())
    }

    /// Get a node by id.
    pub fn get_node(&self, id: &str) -> StateResult<Option<MonitoredNode>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let node: MonitoredNode =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// List all nodes, ordered by id.
    pub fn list_nodes(&self) -> StateResult<Vec<MonitoredNode>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let node: MonitoredNode =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(node);
        }
        Ok(results)
    }

    /// Delete a node and its health log. Returns true if the node existed.
    pub fn delete_node(&self, id: &str) -> StateResult<bool> {
        let (start, end) = log_range(id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();

            let mut log = txn.open_table(HEALTH_LOG).map_err(map_err!(Table))?;
            let keys = collect_keys(&log, &start, &end)?;
            for key in &keys {
                log.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id = %id, existed, "node deleted");
        Ok(existed)
    }

    // ── Health log ─────────────────────────────────────────────────

    /// Append a raw result, pruning the node's oldest entries past retention.
    pub fn append_health_log(&self, node_id: &str, result: &HealthCheckResult) -> StateResult<()> {
        validate_node_id(node_id)?;
        let entry = HealthLogEntry {
            node_id: node_id.to_string(),
            result: result.clone(),
        };
        let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
        let (start, end) = log_range(node_id);

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let pruned;
        {
            let mut table = txn.open_table(HEALTH_LOG).map_err(map_err!(Table))?;
            let (same_start, same_end) = instant_range(node_id, result.timestamp);
            let seq = collect_keys(&table, &same_start, &same_end)?.len();
            let key = log_key(node_id, result.timestamp, seq);
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let keys = collect_keys(&table, &start, &end)?;
            let excess = keys.len().saturating_sub(self.log_retention);
            for key in keys.iter().take(excess) {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            pruned = excess;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if pruned > 0 {
            debug!(%node_id, pruned, "health log pruned");
        }
        Ok(())
    }

    /// Most recent results for a node, newest first.
    pub fn list_health_log(&self, node_id: &str, limit: usize) -> StateResult<Vec<HealthLogEntry>> {
        let (start, end) = log_range(node_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HEALTH_LOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
            .take(limit)
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entry: HealthLogEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(entry);
        }
        Ok(results)
    }
}

/// Node ids become key prefixes, so the separator is reserved.
fn validate_node_id(id: &str) -> StateResult<()> {
    if id.is_empty() || id.contains(':') {
        return Err(StateError::InvalidKey(format!(
            "node id {id:?} must be non-empty and must not contain ':'"
        )));
    }
    Ok(())
}

/// Results sharing a millisecond are kept apart by a per-node sequence
/// number, so they sort in arrival order.
fn log_key(node_id: &str, timestamp: u64, seq: usize) -> String {
    format!("{node_id}:{timestamp:020}:{seq:06}")
}

/// Keys of one node logged at exactly `timestamp`.
fn instant_range(node_id: &str, timestamp: u64) -> (String, String) {
    (
        format!("{node_id}:{timestamp:020}:"),
        format!("{node_id}:{timestamp:020};"),
    )
}

/// Half-open key range covering every log entry of one node.
///
/// `;` is the byte after `:`, so `{id}:` ..`{id};` spans exactly the
/// `{id}:*` keys.
fn log_range(node_id: &str) -> (String, String) {
    (format!("{node_id}:"), format!("{node_id};"))
}

fn collect_keys<T>(table: &T, start: &str, end: &str) -> StateResult<Vec<String>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut keys = Vec::new();
    for entry in table.range(start..end).map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        keys.push(key.value().to_string());
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeguard_core::{Condition, HealthStatus};

    fn test_store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn test_node(id: &str) -> MonitoredNode {
        MonitoredNode {
            id: id.to_string(),
            chain: "eth".to_string(),
            host: "10.0.0.1".to_string(),
            backend: "ethmainnet".to_string(),
            server: None,
            port: 8545,
            threshold: 2,
            haproxy_enabled: true,
            muted: false,
        }
    }

    #[test]
    fn node_crud() {
        let store = test_store();
        store.put_node(&test_node("a")).unwrap();
        store.put_node(&test_node("b")).unwrap();

        assert_eq!(store.get_node("a").unwrap().unwrap().id, "a");
        assert!(store.get_node("missing").unwrap().is_none());
        assert_eq!(store.list_nodes().unwrap().len(), 2);

        assert!(store.delete_node("a").unwrap());
        assert!(!store.delete_node("a").unwrap());
        assert_eq!(store.list_nodes().unwrap().len(), 1);
    }

    #[test]
    fn put_node_rejects_separator_in_id() {
        let store = test_store();
        let err = store.put_node(&test_node("bad:id")).unwrap_err();
        assert!(matches!(err, StateError::InvalidKey(_)));
    }

    #[test]
    fn health_log_is_newest_first_and_scoped_per_node() {
        let store = test_store();
        for ts in [100, 200, 300] {
            store
                .append_health_log("a", &HealthCheckResult::healthy().at(ts))
                .unwrap();
        }
        store
            .append_health_log(
                "ab",
                &HealthCheckResult::error(Condition::Offline, serde_json::Value::Null).at(250),
            )
            .unwrap();

        let log = store.list_health_log("a", 10).unwrap();
        let stamps: Vec<u64> = log.iter().map(|e| e.result.timestamp).collect();
        assert_eq!(stamps, vec![300, 200, 100]);

        let other = store.list_health_log("ab", 10).unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].result.status, HealthStatus::Error);

        assert_eq!(store.list_health_log("a", 2).unwrap().len(), 2);
    }

    #[test]
    fn health_log_prunes_oldest_past_retention() {
        let store = test_store().with_log_retention(2);
        for ts in [1, 2, 3, 4] {
            store
                .append_health_log("a", &HealthCheckResult::healthy().at(ts))
                .unwrap();
        }
        let stamps: Vec<u64> = store
            .list_health_log("a", 10)
            .unwrap()
            .iter()
            .map(|e| e.result.timestamp)
            .collect();
        assert_eq!(stamps, vec![4, 3]);
    }

    #[test]
    fn health_log_keeps_results_with_same_timestamp() {
        let store = test_store();
        store
            .append_health_log(
                "a",
                &HealthCheckResult::error(Condition::Offline, serde_json::Value::Null).at(500),
            )
            .unwrap();
        store
            .append_health_log("a", &HealthCheckResult::healthy().at(500))
            .unwrap();
        store
            .append_health_log("a", &HealthCheckResult::healthy().at(400))
            .unwrap();

        let log = store.list_health_log("a", 10).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].result.timestamp, 500);
        assert_eq!(log[0].result.status, HealthStatus::Ok);
        assert_eq!(log[1].result.status, HealthStatus::Error);
        assert_eq!(log[2].result.timestamp, 400);
    }

    #[test]
    fn delete_node_drops_its_log() {
        let store = test_store();
        store.put_node(&test_node("a")).unwrap();
        store
            .append_health_log("a", &HealthCheckResult::healthy().at(1))
            .unwrap();
        store.delete_node("a").unwrap();
        assert!(store.list_health_log("a", 10).unwrap().is_empty());
    }

    #[test]
    fn on_disk_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodeguard.redb");
        {
            let store = StateStore::open(&path).unwrap();
            store.put_node(&test_node("a")).unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert!(store.get_node("a").unwrap().is_some());
    }
}
