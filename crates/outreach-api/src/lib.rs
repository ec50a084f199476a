//! Outreach API - tracking, health and metrics endpoints
//!
//! Serves the open pixel, click redirects, unsubscribe page and the bounce /
//! reply webhooks, plus liveness, readiness and Prometheus metrics.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
