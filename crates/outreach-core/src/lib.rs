//! Outreach Core - sequencing and deliverability engine
//!
//! Drives contacts through timed campaign steps, allocates sending capacity,
//! ramps new accounts through warmup, and ingests tracking events.

pub mod channels;
pub mod humanize;
pub mod metrics;
pub mod queue;
pub mod sequence;
pub mod tracking;
pub mod warmup;

#[cfg(test)]
mod testing;

pub use channels::{
    CapabilityProbe, ChannelRouter, ChannelSender, HttpChannelDriver, NoCapabilities,
    SendOutcome, SendRequest, SendTarget, SmtpSender,
};
pub use humanize::HumanDelay;
pub use metrics::EngineMetrics;
pub use queue::{
    ChannelActionHandler, ChannelActionJob, EngineJobHandler, Job, JobCategory, JobHandler,
    JobOutcome, JobQueue, MemoryJobQueue, PgJobQueue, QueueError, QueuedJob, WorkerPool,
};
pub use sequence::{
    BusinessHoursGate, CampaignError, CampaignManager, CapacityAllocator, ConditionEvaluator,
    CycleReport, CycleSkip, EnrollmentOutcome, SequenceScheduler, TemplateRenderer,
    TrackingLinks,
};
pub use tracking::{BounceEvent, BounceKind, TokenSigner, TrackingIngester};
pub use warmup::{HealthScore, RampTable, WarmupEngine, WarmupSession};
