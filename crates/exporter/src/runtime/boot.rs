//! Boot — logging init and configuration loading.

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::conf::{Config, ConfigError, LogFormat, LogLevel, StartupFlags};

/// Initialise the tracing subsystem. `RUST_LOG` wins over the flag level.
pub fn init_logging(level: LogLevel, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    match format {
        LogFormat::Json => {
            let layer = fmt::layer().json().with_target(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Console => {
            let layer = fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

/// Load, validate and compile the configuration named by `flags`.
pub fn load_config(flags: &StartupFlags) -> Result<Config, ConfigError> {
    let mut config = Config::load(flags)?;
    config.validate()?;
    config.compile()?;

    info!(
        "Loaded configuration: listen={}, endpoint={}, namespaces={}",
        config.listen.socket_address(),
        config.listen.metrics_endpoint,
        config.namespaces.len()
    );
    for ns in &config.namespaces {
        info!(
            namespace = %ns.name,
            files = ns.source.files.len(),
            syslog = ns.source.syslog.is_some(),
            relabelings = ns.relabelings.len(),
            "Namespace configured"
        );
    }
    Ok(config)
}
