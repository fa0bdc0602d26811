//! HTTP handlers for the telemetry endpoints.

use crate::error::{ErrorKind, SyncError};
use crate::metrics::data::{Snapshot, VolatileSnapshot};
use crate::metrics::TelemetrySource;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

pub type SourceState = State<Arc<dyn TelemetrySource>>;

/// `GET /api/specs`
pub async fn get_full_snapshot(State(source): SourceState) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(source.full_snapshot().await?))
}

/// `GET /api/specs/dynamic`
pub async fn get_volatile_snapshot(
    State(source): SourceState,
) -> Result<Json<VolatileSnapshot>, ApiError> {
    Ok(Json(source.volatile_snapshot().await?))
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "specdash",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// A source failure rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        error!(error = %self.0, ?kind, "Failed to read telemetry");

        let body = Json(json!({
            "error": self.0.to_string(),
            "kind": kind,
        }));
        (status, body).into_response()
    }
}
