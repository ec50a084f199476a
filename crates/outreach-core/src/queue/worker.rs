//! Per-category poll loops bounded by a semaphore

use super::{JobCategory, JobHandler, JobOutcome, JobQueue, QueueError, QueuedJob};
use crate::metrics::EngineMetrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct Registration {
    category: JobCategory,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
}

/// Runs registered handlers against the queue
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    metrics: EngineMetrics,
    poll_interval: Duration,
    registrations: Vec<Registration>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, metrics: EngineMetrics, poll_interval: Duration) -> Self {
        Self {
            queue,
            metrics,
            poll_interval,
            registrations: Vec::new(),
        }
    }

    /// Handle `category` with at most `concurrency` jobs in flight
    pub fn register(
        mut self,
        category: JobCategory,
        handler: Arc<dyn JobHandler>,
        concurrency: usize,
    ) -> Self {
        self.registrations.push(Registration {
            category,
            handler,
            concurrency: concurrency.max(1),
        });
        self
    }

    /// Start one poll loop per registered category
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        self.registrations
            .into_iter()
            .map(|registration| {
                let queue = self.queue.clone();
                let metrics = self.metrics.clone();
                let poll_interval = self.poll_interval;
                tokio::spawn(async move {
                    run_category(queue, metrics, registration, poll_interval).await;
                })
            })
            .collect()
    }

    /// Claim and run one batch of `category` to completion
    pub async fn drain_once(&self, category: JobCategory) -> Result<usize, QueueError> {
        let Some(registration) = self.registrations.iter().find(|r| r.category == category) else {
            return Ok(0);
        };

        let jobs = self.queue.claim(category, registration.concurrency).await?;
        let count = jobs.len();
        for job in jobs {
            execute(&self.queue, &self.metrics, &registration.handler, category, job).await;
        }
        Ok(count)
    }
}

async fn run_category(
    queue: Arc<dyn JobQueue>,
    metrics: EngineMetrics,
    registration: Registration,
    poll_interval: Duration,
) {
    let category = registration.category;
    let mut ticker = interval(poll_interval);
    let semaphore = Arc::new(Semaphore::new(registration.concurrency));

    info!(
        "Worker started for {} (concurrency: {}, interval: {:?})",
        category, registration.concurrency, poll_interval
    );

    loop {
        ticker.tick().await;

        let available = semaphore.available_permits();
        if available == 0 {
            continue;
        }

        let jobs = match queue.claim(category, available).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Error claiming {} jobs: {}", category, e);
                continue;
            }
        };

        if !jobs.is_empty() {
            debug!("Claimed {} {} jobs", jobs.len(), category);
        }

        for job in jobs {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let queue = queue.clone();
            let metrics = metrics.clone();
            let handler = registration.handler.clone();

            tokio::spawn(async move {
                execute(&queue, &metrics, &handler, category, job).await;
                drop(permit);
            });
        }
    }
}

async fn execute(
    queue: &Arc<dyn JobQueue>,
    metrics: &EngineMetrics,
    handler: &Arc<dyn JobHandler>,
    category: JobCategory,
    queued: QueuedJob,
) {
    let job_id = queued.id;
    debug!(job_id = %job_id, "Processing {} job", category);

    match handler.handle(queued.job).await {
        Ok(JobOutcome::Done) => {
            metrics.record_job(category.as_str(), "completed");
            if let Err(e) = queue.complete(job_id).await {
                error!(job_id = %job_id, "Failed to mark job as completed: {}", e);
            }
        }
        Ok(JobOutcome::Reschedule { job, after }) => {
            metrics.record_job(category.as_str(), "rescheduled");
            let after = chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::minutes(1));
            if let Err(e) = queue.reschedule(job_id, job, Utc::now() + after).await {
                error!(job_id = %job_id, "Failed to reschedule job: {}", e);
            }
        }
        Err(e) => {
            metrics.record_job(category.as_str(), "failed");
            warn!(job_id = %job_id, "{} job failed: {:#}", category, e);
            if let Err(e) = queue.fail(job_id, &e.to_string()).await {
                error!(job_id = %job_id, "Failed to record job failure: {}", e);
            }
        }
    }
}
