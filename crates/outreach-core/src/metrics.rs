//! Prometheus metrics for the engine

use outreach_common::types::AccountId;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Engine metrics, cheap to clone
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    sends: IntCounterVec,
    send_failures: IntCounterVec,
    deferrals: IntCounterVec,
    condition_skips: IntCounter,
    tracking_events: IntCounterVec,
    jobs: IntCounterVec,
    account_health: GaugeVec,
}

impl EngineMetrics {
    /// Create metrics registered in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let sends = IntCounterVec::new(
            Opts::new("outreach_sends_total", "Successful outbound sends"),
            &["channel"],
        )?;
        let send_failures = IntCounterVec::new(
            Opts::new("outreach_send_failures_total", "Failed outbound sends"),
            &["channel"],
        )?;
        let deferrals = IntCounterVec::new(
            Opts::new("outreach_deferrals_total", "Due contacts left for a later cycle"),
            &["reason"],
        )?;
        let condition_skips = IntCounter::new(
            "outreach_condition_skips_total",
            "Steps skipped because their conditions did not hold",
        )?;
        let tracking_events = IntCounterVec::new(
            Opts::new("outreach_tracking_events_total", "Ingested tracking events"),
            &["kind"],
        )?;
        let jobs = IntCounterVec::new(
            Opts::new("outreach_jobs_total", "Processed queue jobs"),
            &["category", "outcome"],
        )?;
        let account_health = GaugeVec::new(
            Opts::new("outreach_account_health_score", "Sending account health score (0-100)"),
            &["account_id"],
        )?;

        registry.register(Box::new(sends.clone()))?;
        registry.register(Box::new(send_failures.clone()))?;
        registry.register(Box::new(deferrals.clone()))?;
        registry.register(Box::new(condition_skips.clone()))?;
        registry.register(Box::new(tracking_events.clone()))?;
        registry.register(Box::new(jobs.clone()))?;
        registry.register(Box::new(account_health.clone()))?;

        Ok(Self {
            registry,
            sends,
            send_failures,
            deferrals,
            condition_skips,
            tracking_events,
            jobs,
            account_health,
        })
    }

    pub fn record_send(&self, channel: &str) {
        self.sends.with_label_values(&[channel]).inc();
    }

    pub fn record_send_failure(&self, channel: &str) {
        self.send_failures.with_label_values(&[channel]).inc();
    }

    pub fn record_deferral(&self, reason: &str) {
        self.deferrals.with_label_values(&[reason]).inc();
    }

    pub fn record_condition_skip(&self) {
        self.condition_skips.inc();
    }

    pub fn record_tracking_event(&self, kind: &str) {
        self.tracking_events.with_label_values(&[kind]).inc();
    }

    pub fn record_job(&self, category: &str, outcome: &str) {
        self.jobs.with_label_values(&[category, outcome]).inc();
    }

    pub fn set_account_health(&self, account_id: AccountId, score: f64) {
        self.account_health
            .with_label_values(&[&account_id.to_string()])
            .set(score);
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
