//! Shared handler state

use outreach_core::{EngineMetrics, TrackingIngester};
use outreach_storage::Repositories;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub ingester: TrackingIngester,
    pub metrics: EngineMetrics,
    /// Expected key for `X-Outreach-Signature` on webhooks; unchecked when unset
    pub bounce_webhook_secret: Option<String>,
}
