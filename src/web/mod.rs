//! HTTP endpoints exposing a telemetry source.
//!
//! `GET /api/specs` returns the full snapshot, `GET /api/specs/dynamic` the
//! volatile subset. An [`HttpSource`](crate::HttpSource) pointed at this
//! server reads it back.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{Result, SyncError};
use crate::metrics::TelemetrySource;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Serve `source` with the provided configuration until the server fails.
pub async fn start_web_server(config: WebConfig, source: Arc<dyn TelemetrySource>) -> Result<()> {
    let app = create_app(&config, source);

    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| SyncError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SyncError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    info!("Serving telemetry on http://{}", addr);
    info!("Full snapshot: http://{}/api/specs", addr);
    info!("Volatile snapshot: http://{}/api/specs/dynamic", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| SyncError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
