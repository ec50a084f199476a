//! Persisted work queue and the worker pool that drains it

mod handler;
mod job;
mod memory;
mod postgres;
mod worker;

pub use handler::{ChannelActionHandler, EngineJobHandler};
pub use job::{ChannelActionJob, Job, JobCategory, SequenceAdvanceJob, WarmupJob};
pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;
pub use worker::WorkerPool;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use outreach_common::types::JobId;
use thiserror::Error;

/// Attempts before a job is marked failed for good
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    NotFound(JobId),
}

/// A job handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: JobId,
    pub job: Job,
    /// Failed attempts so far
    pub attempts: i32,
}

/// What a handler wants done with its job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done,
    /// Run `job` again after `after`, in place of a blocking sleep
    Reschedule {
        job: Job,
        after: std::time::Duration,
    },
}

/// Executes jobs of one or more categories
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> anyhow::Result<JobOutcome>;
}

/// Typed work queue with at-least-once delivery
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns `None` when a live job with the same dedupe key already exists
    async fn enqueue(&self, job: Job, run_at: DateTime<Utc>) -> Result<Option<JobId>, QueueError>;
    /// Claim up to `limit` due jobs of a category
    async fn claim(&self, category: JobCategory, limit: usize) -> Result<Vec<QueuedJob>, QueueError>;
    async fn complete(&self, id: JobId) -> Result<(), QueueError>;
    /// Record a failure; returns true if the job will be retried
    async fn fail(&self, id: JobId, error: &str) -> Result<bool, QueueError>;
    /// Put a claimed job back as pending with a new payload
    async fn reschedule(&self, id: JobId, job: Job, run_at: DateTime<Utc>) -> Result<(), QueueError>;
    /// Release jobs claimed before `before` by a worker that never finished them
    async fn recover_stale(&self, before: DateTime<Utc>) -> Result<u64, QueueError>;
}

/// Exponential retry delay: 2^attempts minutes, capped at four hours
pub(crate) fn calculate_backoff(attempts: i32) -> Duration {
    let minutes = std::cmp::min(2_i64.pow(attempts.clamp(0, 16) as u32), 240);
    Duration::minutes(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_calculate_backoff() {
        assert_eq!(calculate_backoff(0), Duration::minutes(1));
        assert_eq!(calculate_backoff(1), Duration::minutes(2));
        assert_eq!(calculate_backoff(3), Duration::minutes(8));
        assert_eq!(calculate_backoff(10), Duration::minutes(240));
    }
}
