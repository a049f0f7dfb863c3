use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use nginxlog_exporter::conf::StartupFlags;
use nginxlog_exporter::metrics::VERSION;
use nginxlog_exporter::runtime::{self, boot, lifecycle::Lifecycle};

#[tokio::main]
async fn main() -> ExitCode {
    let flags = StartupFlags::parse();
    if flags.version {
        println!("nginxlog-exporter version {}", VERSION);
        return ExitCode::SUCCESS;
    }

    boot::init_logging(flags.log_level, flags.log_format);

    let config = match boot::load_config(&flags).context("Failed to load configuration") {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if flags.verify_config {
        println!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    let lifecycle = Lifecycle::new();
    let result = runtime::run(config, &lifecycle).await;
    lifecycle.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
