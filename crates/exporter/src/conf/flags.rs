//! Flags — command-line surface.

use clap::{Parser, ValueEnum};

use super::model::{ParserKind, DEFAULT_FORMAT};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nginxlog-exporter",
    about = "Export Prometheus metrics from nginx access logs",
    disable_version_flag = true
)]
pub struct StartupFlags {
    /// HTTP port to listen on
    #[arg(long, default_value_t = 4040)]
    pub listen_port: u16,

    /// IP address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_address: String,

    /// Access log parser
    #[arg(long, value_enum, default_value_t = ParserKind::Text)]
    pub parser: ParserKind,

    /// nginx access log format
    #[arg(long, default_value = DEFAULT_FORMAT)]
    pub format: String,

    /// Namespace used as metric name prefix
    #[arg(long, default_value = "nginx")]
    pub namespace: String,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(long)]
    pub config_file: Option<String>,

    /// URL path at which to serve metrics
    #[arg(long, default_value = "/metrics")]
    pub metrics_endpoint: String,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, value_enum, default_value_t = LogFormat::Console)]
    pub log_format: LogFormat,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    pub verify_config: bool,

    /// Print version information and exit
    #[arg(long)]
    pub version: bool,

    /// Access log files to follow when no config file is given
    pub filenames: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    #[value(alias = "warn")]
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Console,
    Json,
}
