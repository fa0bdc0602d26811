//! Web application router and middleware setup.

use crate::metrics::remote::{FULL_SNAPSHOT_PATH, VOLATILE_SNAPSHOT_PATH};
use crate::metrics::TelemetrySource;
use crate::web::config::WebConfig;
use crate::web::handlers;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the axum application exposing `source` over HTTP.
pub fn create_app(config: &WebConfig, source: Arc<dyn TelemetrySource>) -> Router {
    let mut app = Router::new()
        .route(FULL_SNAPSHOT_PATH, get(handlers::get_full_snapshot))
        .route(VOLATILE_SNAPSHOT_PATH, get(handlers::get_volatile_snapshot))
        .route("/health", get(handlers::health_check))
        .with_state(source);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
