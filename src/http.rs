//! HTTP endpoint exposing Prometheus metrics.

use axum::{Router, routing::get};
use tracing::{error, info};

async fn metrics_handler() -> String {
    crate::metrics::render()
}

/// Serve `/metrics` on the given port until the process exits.
pub async fn run_http_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = format!("0.0.0.0:{port}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, error = %err, "Failed to bind metrics endpoint");
            return;
        }
    };
    info!(%addr, "Metrics endpoint listening");

    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "Metrics endpoint terminated");
    }
}
