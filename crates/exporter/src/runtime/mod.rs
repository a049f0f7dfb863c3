//! Runtime module — boot, HTTP serve, signal handling, and the shutdown lifecycle.

pub mod boot;
pub mod lifecycle;
pub mod serve;
pub mod stop;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::conf::Config;
use crate::service::{NamespaceError, NamespaceRunner};
use crate::state::ExporterState;
use lifecycle::Lifecycle;
use stop::shutdown_signal;

/// Start every namespace and the HTTP server, then wait for a signal, a
/// server failure, or a process-fatal namespace error.
///
/// Namespaces that fail for non-fatal reasons are logged and the
/// remaining ones keep being served. The caller runs
/// [`Lifecycle::shutdown`] afterwards on every path.
pub async fn run(config: Config, lifecycle: &Lifecycle) -> Result<()> {
    run_until(config, lifecycle, shutdown_signal()).await
}

/// [`run`] with the stop trigger supplied by the caller.
pub async fn run_until(
    config: Config,
    lifecycle: &Lifecycle,
    stop: impl Future<Output = ()>,
) -> Result<()> {
    let mut runners = Vec::with_capacity(config.namespaces.len());
    for ns in config.namespaces {
        runners.push(Arc::new(NamespaceRunner::new(ns)?));
    }

    let state = Arc::new(
        ExporterState::new(runners.iter().map(|r| r.registry()))
            .context("Failed to build metrics registry")?,
    );

    let listener = serve::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen.socket_address()))?;
    let endpoint = config.listen.metrics_endpoint.clone();
    let mut server = tokio::spawn({
        let state = Arc::clone(&state);
        let token = lifecycle.token();
        async move { serve::serve(listener, state, &endpoint, token).await }
    });

    let mut namespaces: JoinSet<(String, Result<(), NamespaceError>)> = JoinSet::new();
    for runner in runners {
        let lifecycle = lifecycle.clone();
        namespaces.spawn(async move {
            let name = runner.name().to_string();
            (name, runner.run(&lifecycle).await)
        });
    }

    info!("nginxlog-exporter is ready, press Ctrl+C to shutdown");

    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => return Ok(()),

            joined = &mut server => {
                return match joined {
                    Ok(Ok(())) if lifecycle.is_stopping() => Ok(()),
                    Ok(Ok(())) => Err(anyhow::anyhow!("HTTP server stopped unexpectedly")),
                    Ok(Err(e)) => Err(e).context("HTTP server failed"),
                    Err(e) => Err(e).context("HTTP server task failed"),
                };
            }

            Some(joined) = namespaces.join_next(), if !namespaces.is_empty() => {
                match joined {
                    Ok((name, Ok(()))) => info!(namespace = %name, "Namespace finished"),
                    Ok((_, Err(e))) if e.is_process_fatal() => return Err(e.into()),
                    Ok((name, Err(e))) => error!(namespace = %name, "Namespace stopped: {}", e),
                    Err(e) => error!("Namespace task failed: {}", e),
                }
            }
        }
    }
}
