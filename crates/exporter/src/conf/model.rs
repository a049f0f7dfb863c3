//! Model — normalized exporter configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::relabel::RuleSet;

pub const DEFAULT_FORMAT: &str = r#"$remote_addr - $remote_user [$time_local] "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent" "$http_x_forwarded_for""#;

/// Prometheus client default histogram buckets.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: ListenConfig,
    pub namespaces: Vec<NamespaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub port: u16,
    pub address: String,
    pub metrics_endpoint: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            port: 4040,
            address: "0.0.0.0".to_string(),
            metrics_endpoint: "/metrics".to_string(),
        }
    }
}

impl ListenConfig {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    #[default]
    Text,
    Json,
}

/// One metric namespace: a group of sources sharing a parser and a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub name: String,
    pub namespace_label: Option<String>,
    pub metrics_override: Option<MetricsOverride>,

    /// Deprecated; folded into `source.files` during compilation.
    pub source_files: Vec<String>,
    pub source: SourceData,

    pub parser: ParserKind,
    pub format: String,
    pub labels: BTreeMap<String, String>,
    pub relabel_configs: Vec<RelabelConfig>,
    pub histogram_buckets: Vec<f64>,
    pub metrics: MetricsConfig,
    pub print_log: bool,

    // Derived by `compile`
    #[serde(skip)]
    pub ordered_label_names: Vec<String>,
    #[serde(skip)]
    pub ordered_label_values: Vec<String>,
    #[serde(skip)]
    pub namespace_labels: BTreeMap<String, String>,
    #[serde(skip)]
    pub namespace_prefix: String,
    #[serde(skip)]
    pub relabelings: RuleSet,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace_label: None,
            metrics_override: None,
            source_files: Vec::new(),
            source: SourceData::default(),
            parser: ParserKind::Text,
            format: DEFAULT_FORMAT.to_string(),
            labels: BTreeMap::new(),
            relabel_configs: Vec::new(),
            histogram_buckets: DEFAULT_BUCKETS.to_vec(),
            metrics: MetricsConfig::default(),
            print_log: false,
            ordered_label_names: Vec::new(),
            ordered_label_values: Vec::new(),
            namespace_labels: BTreeMap::new(),
            namespace_prefix: String::new(),
            relabelings: RuleSet::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsOverride {
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceData {
    pub files: Vec<String>,
    pub syslog: Option<SyslogSource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogSource {
    pub listen_address: String,
    pub format: String,
    pub tags: Vec<String>,
}

/// Per-metric switches and the current-users window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds; 0 disables the current-users gauge.
    pub current_user_interval: u64,
    pub disable_count_total: bool,
    pub disable_response_bytes_total: bool,
    pub disable_request_bytes_total: bool,
    pub disable_upstream_seconds: bool,
    pub disable_upstream_connect_seconds: bool,
    pub disable_response_seconds: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelabelConfig {
    pub target_label: String,
    pub from: String,
    pub whitelist: Vec<String>,
    pub matches: Vec<RelabelMatch>,
    /// 1-based index into the value split by `separator`; 0 disables splitting.
    pub split: usize,
    pub separator: String,
    pub only_counter: bool,
    pub exclude: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelabelMatch {
    pub regexp: String,
    pub replacement: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ── Defaults ─────────────────────────────────────────────────

    #[test]
    fn test_listen_config_defaults() {
        let listen = ListenConfig::default();
        assert_eq!(listen.port, 4040);
        assert_eq!(listen.address, "0.0.0.0");
        assert_eq!(listen.metrics_endpoint, "/metrics");
        assert_eq!(listen.socket_address(), "0.0.0.0:4040");
    }

    #[test]
    fn test_namespace_defaults() {
        let ns = NamespaceConfig::default();
        assert_eq!(ns.parser, ParserKind::Text);
        assert_eq!(ns.format, DEFAULT_FORMAT);
        assert_eq!(ns.histogram_buckets, DEFAULT_BUCKETS.to_vec());
        assert_eq!(ns.metrics.current_user_interval, 0);
        assert!(!ns.print_log);
    }

    // ── Deserialization ──────────────────────────────────────────

    #[test]
    fn test_deserialize_partial_toml() {
        let toml_str = r#"
            [listen]
            port = 9000

            [[namespaces]]
            name = "app"
            parser = "json"
            source = { files = ["/var/log/nginx/access.log"] }

            [namespaces.labels]
            env = "prod"

            [[namespaces.relabel_configs]]
            target_label = "vhost"
            from = "server_name"
            only_counter = true
        "#;

        let cfg: Config = toml::from_str(toml_str).expect("Should accept partial TOML");
        assert_eq!(cfg.listen.port, 9000);
        assert_eq!(cfg.listen.metrics_endpoint, "/metrics");

        let ns = &cfg.namespaces[0];
        assert_eq!(ns.name, "app");
        assert_eq!(ns.parser, ParserKind::Json);
        assert_eq!(ns.source.files, vec!["/var/log/nginx/access.log".to_string()]);
        assert_eq!(ns.labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(ns.relabel_configs[0].target_label, "vhost");
        assert!(ns.relabel_configs[0].only_counter);
        assert_eq!(ns.format, DEFAULT_FORMAT);
    }

    #[test]
    fn test_deserialize_syslog_source() {
        let toml_str = r#"
            name = "edge"
            [source.syslog]
            listen_address = "udp://127.0.0.1:5531"
            tags = ["nginx", "nginx2"]
        "#;
        let ns: NamespaceConfig = toml::from_str(toml_str).unwrap();
        let syslog = ns.source.syslog.expect("syslog source");
        assert_eq!(syslog.listen_address, "udp://127.0.0.1:5531");
        assert_eq!(syslog.tags.len(), 2);
    }

    #[test]
    fn test_unknown_parser_rejected() {
        let result: Result<NamespaceConfig, _> = toml::from_str(r#"parser = "logfmt""#);
        assert!(result.is_err());
    }
}
