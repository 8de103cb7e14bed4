//! Where nodes come from and where raw results go.

use nodeguard_core::{HealthCheckResult, MonitoredNode};
use nodeguard_state::StateStore;

/// Read-only node source plus fire-and-forget result sink.
///
/// Methods are synchronous; the monitor calls them from blocking tasks.
pub trait Catalog: Send + Sync + 'static {
    fn list_nodes(&self) -> anyhow::Result<Vec<MonitoredNode>>;

    fn get_node(&self, id: &str) -> anyhow::Result<Option<MonitoredNode>>;

    fn record_result(&self, node_id: &str, result: &HealthCheckResult) -> anyhow::Result<()>;
}

impl Catalog for StateStore {
    fn list_nodes(&self) -> anyhow::Result<Vec<MonitoredNode>> {
        Ok(StateStore::list_nodes(self)?)
    }

    fn get_node(&self, id: &str) -> anyhow::Result<Option<MonitoredNode>> {
        Ok(StateStore::get_node(self, id)?)
    }

    fn record_result(&self, node_id: &str, result: &HealthCheckResult) -> anyhow::Result<()> {
        Ok(self.append_health_log(node_id, result)?)
    }
}
