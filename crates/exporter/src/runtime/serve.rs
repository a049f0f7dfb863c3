//! Serve — the HTTP listener exposing the metrics endpoint.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::conf::ListenConfig;
use crate::state::SharedState;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router(state: SharedState, endpoint: &str) -> Router {
    Router::new()
        .route(endpoint, get(metrics))
        .with_state(state)
}

async fn metrics(State(state): State<SharedState>) -> Response {
    match state.render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Bind the listen address. Failure here is fatal at startup.
pub async fn bind(listen: &ListenConfig) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(listen.socket_address()).await?;
    info!(
        "Serving metrics on http://{}{}",
        listener.local_addr()?,
        listen.metrics_endpoint
    );
    Ok(listener)
}

/// Serve until `stop` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    endpoint: &str,
    stop: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state, endpoint);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

pub fn local_addr(listener: &TcpListener) -> Option<SocketAddr> {
    listener.local_addr().ok()
}
