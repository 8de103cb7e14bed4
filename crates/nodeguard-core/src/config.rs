//! nodeguard.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::MonitoredNode;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeguardConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub haproxy: HaproxyConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// Nodes seeded into the catalog at startup.
    #[serde(default)]
    pub nodes: Vec<MonitoredNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Polling period per node (e.g. "10s").
    pub interval: String,
    /// Deadline for a single probe; exceeding it counts as an ERROR.
    pub probe_timeout: String,
    /// Deadline for persisting a raw result to the catalog.
    pub persist_timeout: String,
    /// How often the fleet is re-read to start/stop node tasks.
    pub reconcile_interval: String,
    /// HTTP path probed by the built-in reachability prober.
    pub probe_path: String,
    /// Buffered events per bus channel.
    pub bus_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: "10s".to_string(),
            probe_timeout: "5s".to_string(),
            persist_timeout: "2s".to_string(),
            reconcile_interval: "30s".to_string(),
            probe_path: "/health".to_string(),
            bus_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaproxyConfig {
    /// Stats socket TCP address (e.g. "127.0.0.1:9999").
    pub address: String,
    pub timeout: String,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9999".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Chat webhook URL. Alerts are only logged when unset.
    pub chat_webhook_url: Option<String>,
    /// Incident API base URL (e.g. "https://api.pagerduty.com").
    pub incident_api_url: Option<String>,
    pub incident_api_token: Option<String>,
    pub incident_service_id: Option<String>,
    /// Requester email sent in the `From` header.
    pub incident_from: Option<String>,
    /// Chains whose alerts also open an incident.
    #[serde(default)]
    pub critical_chains: Vec<String>,
    /// Deadline for each outbound alert call.
    pub timeout: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            chat_webhook_url: None,
            incident_api_url: None,
            incident_api_token: None,
            incident_service_id: None,
            incident_from: None,
            critical_chains: Vec::new(),
            timeout: "10s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Raw results retained per node in the health log.
    pub max_log_entries_per_node: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/nodeguard/nodeguard.redb"),
            max_log_entries_per_node: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8480 }
    }
}

impl NodeguardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeguardConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configs the monitor cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("monitor.interval", &self.monitor.interval),
            ("monitor.probe_timeout", &self.monitor.probe_timeout),
            ("monitor.persist_timeout", &self.monitor.persist_timeout),
            ("monitor.reconcile_interval", &self.monitor.reconcile_interval),
            ("haproxy.timeout", &self.haproxy.timeout),
            ("alerts.timeout", &self.alerts.timeout),
        ] {
            match parse_duration(value) {
                None => anyhow::bail!("invalid duration for {field}: {value:?}"),
                Some(d) if d.is_zero() => anyhow::bail!("{field} must be greater than zero"),
                Some(_) => {}
            }
        }

        if self.monitor.bus_capacity == 0 {
            anyhow::bail!("monitor.bus_capacity must be positive");
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.threshold == 0 {
                anyhow::bail!("node {}: threshold must be positive", node.id);
            }
            if !seen.insert(node.id.as_str()) {
                anyhow::bail!("duplicate node id {}", node.id);
            }
        }
        Ok(())
    }

    /// Scaffold a starter nodeguard.toml with one example node.
    pub fn scaffold() -> Self {
        NodeguardConfig {
            nodes: vec![MonitoredNode {
                id: "eth-mainnet-1".to_string(),
                chain: "eth".to_string(),
                host: "10.0.0.10".to_string(),
                backend: "ethmainnet".to_string(),
                server: Some("eth1".to_string()),
                port: 8545,
                threshold: 3,
                haproxy_enabled: true,
                muted: false,
            }],
            ..Default::default()
        }
    }
}

/// Parse a duration string: a whole number followed by `ms`, `s`, `m`
/// or no unit (seconds).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(value)),
        "ms" => Some(Duration::from_millis(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}

/// Parse a duration, falling back to `default` on malformed input.
pub fn duration_or(s: &str, default: Duration) -> Duration {
    parse_duration(s).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_round_trips() {
        let config = NodeguardConfig::scaffold();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("eth-mainnet-1"));
        let parsed: NodeguardConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.nodes.len(), 1);
        parsed.validate().unwrap();
    }

    #[test]
    fn test_parse_minimal() {
        let config: NodeguardConfig = toml::from_str("").unwrap();
        assert_eq!(config.monitor.interval, "10s");
        assert_eq!(config.haproxy.address, "127.0.0.1:9999");
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_parse_nodes() {
        let toml_str = r#"
[alerts]
critical_chains = ["eth"]
timeout = "3s"

[[nodes]]
id = "pol-1"
chain = "pol"
host = "pol1.internal"
backend = "polmainnet"
port = 8545
threshold = 2
"#;
        let config: NodeguardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.nodes[0].id, "pol-1");
        assert!(!config.nodes[0].muted);
        assert!(!config.nodes[0].haproxy_enabled);
        assert_eq!(config.alerts.critical_chains, vec!["eth".to_string()]);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = NodeguardConfig::scaffold();
        config.nodes[0].threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut config = NodeguardConfig::scaffold();
        let dup = config.nodes[0].clone();
        config.nodes.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_duration() {
        let mut config = NodeguardConfig::default();
        config.monitor.interval = "soon".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = NodeguardConfig::default();
        config.monitor.interval = "0s".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor.interval"));

        for field in ["reconcile", "probe", "persist", "haproxy", "alerts"] {
            let mut config = NodeguardConfig::default();
            match field {
                "reconcile" => config.monitor.reconcile_interval = "0ms".to_string(),
                "probe" => config.monitor.probe_timeout = "0".to_string(),
                "persist" => config.monitor.persist_timeout = "0s".to_string(),
                "haproxy" => config.haproxy.timeout = "0m".to_string(),
                _ => config.alerts.timeout = "0s".to_string(),
            }
            assert!(config.validate().is_err(), "{field} accepted zero");
        }
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("x"), None);
        assert_eq!(parse_duration("5h"), None);
        assert_eq!(parse_duration("ms"), None);
        assert_eq!(duration_or("x", Duration::from_secs(2)), Duration::from_secs(2));
    }
}
