//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, metrics, tracking};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Tracking routes, linked from outbound messages
    let tracking_routes = Router::new()
        .route("/o/:tracking_id", get(tracking::open))
        .route("/c/:tracking_id", get(tracking::click))
        .route("/u/:tracking_id", get(tracking::unsubscribe))
        .route("/bounce", post(tracking::bounce))
        .route("/reply", post(tracking::reply))
        .with_state(state.clone());

    Router::new()
        .nest("/health", health_routes)
        .merge(tracking_routes)
        .route("/metrics", get(metrics::metrics).with_state(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
