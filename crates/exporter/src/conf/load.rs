//! Load — config loading from file, environment variables, and flags.

use thiserror::Error;

use super::flags::StartupFlags;
use super::model::{Config, ListenConfig, NamespaceConfig, SourceData};
use crate::relabel::RelabelError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("namespace '{namespace}': {source}")]
    Relabel {
        namespace: String,
        #[source]
        source: RelabelError,
    },
}

impl Config {
    /// Load the configuration named by `--config-file`, or synthesize a
    /// single namespace from the flags when none is given.
    pub fn load(flags: &StartupFlags) -> Result<Self, ConfigError> {
        match &flags.config_file {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path);
                Self::from_file(path)
            }
            None => Ok(Self::from_flags(flags)),
        }
    }

    /// Load configuration from a YAML, TOML or JSON file.
    /// Priority: Environment Variables > Config File > Defaults
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            // Double underscore for nested keys: NGINXLOG_LISTEN__PORT
            .add_source(
                config::Environment::with_prefix("NGINXLOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_flags(flags: &StartupFlags) -> Self {
        Self {
            listen: ListenConfig {
                port: flags.listen_port,
                address: flags.listen_address.clone(),
                metrics_endpoint: flags.metrics_endpoint.clone(),
            },
            namespaces: vec![NamespaceConfig {
                name: flags.namespace.clone(),
                parser: flags.parser,
                format: flags.format.clone(),
                source: SourceData {
                    files: flags.filenames.clone(),
                    syslog: None,
                },
                ..Default::default()
            }],
        }
    }

    /// Validate that configuration values are sane before compilation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.listen.metrics_endpoint.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "metrics_endpoint must start with '/': {}",
                self.listen.metrics_endpoint
            )));
        }
        if self.namespaces.is_empty() {
            return Err(ConfigError::Invalid("no namespaces configured".to_string()));
        }
        for ns in &self.namespaces {
            ns.validate()?;
        }
        Ok(())
    }
}

impl NamespaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("namespace name must not be empty".to_string()));
        }

        let has_files = !self.source.files.is_empty() || !self.source_files.is_empty();
        if !has_files && self.source.syslog.is_none() {
            return Err(ConfigError::Invalid(format!(
                "namespace '{}' has no file or syslog source",
                self.name
            )));
        }

        if let Some(syslog) = &self.source.syslog {
            if syslog.tags.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "namespace '{}': syslog source needs at least one tag",
                    self.name
                )));
            }
        }

        if self.histogram_buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid(format!(
                "namespace '{}': histogram_buckets must be strictly increasing",
                self.name
            )));
        }

        for relabel in &self.relabel_configs {
            if relabel.target_label.is_empty() || relabel.from.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "namespace '{}': relabel config needs both target_label and from",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
