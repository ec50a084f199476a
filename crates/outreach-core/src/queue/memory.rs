//! In-memory queue backend for tests and the `memory` database backend

use super::{calculate_backoff, Job, JobCategory, JobQueue, QueueError, QueuedJob, DEFAULT_MAX_ATTEMPTS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::JobId;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
struct Entry {
    id: JobId,
    job: Job,
    dedupe_key: Option<String>,
    status: EntryStatus,
    attempts: i32,
    last_error: Option<String>,
    run_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self) -> bool {
        matches!(self.status, EntryStatus::Pending | EntryStatus::Processing)
    }
}

/// Queue held in process memory
#[derive(Default)]
pub struct MemoryJobQueue {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending jobs of a category, due or not
    pub async fn pending(&self, category: JobCategory) -> Vec<(Job, DateTime<Utc>)> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.status == EntryStatus::Pending && e.job.category() == category)
            .map(|e| (e.job.clone(), e.run_at))
            .collect()
    }

    /// Last error of a job, if any
    pub async fn last_error(&self, id: JobId) -> Option<String> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.last_error.clone())
    }

    /// Move every pending job's run time to now
    pub async fn make_due(&self) {
        let now = Utc::now();
        for entry in self.entries.lock().await.iter_mut() {
            if entry.status == EntryStatus::Pending {
                entry.run_at = now;
            }
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job, run_at: DateTime<Utc>) -> Result<Option<JobId>, QueueError> {
        let mut entries = self.entries.lock().await;
        let dedupe_key = job.dedupe_key();
        if let Some(key) = &dedupe_key {
            if entries
                .iter()
                .any(|e| e.is_live() && e.dedupe_key.as_ref() == Some(key))
            {
                return Ok(None);
            }
        }

        let id = Uuid::now_v7();
        entries.push(Entry {
            id,
            job,
            dedupe_key,
            status: EntryStatus::Pending,
            attempts: 0,
            last_error: None,
            run_at,
            started_at: None,
        });
        Ok(Some(id))
    }

    async fn claim(&self, category: JobCategory, limit: usize) -> Result<Vec<QueuedJob>, QueueError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;

        let mut due: Vec<&mut Entry> = entries
            .iter_mut()
            .filter(|e| {
                e.status == EntryStatus::Pending && e.job.category() == category && e.run_at <= now
            })
            .collect();
        due.sort_by_key(|e| e.run_at);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|entry| {
                entry.status = EntryStatus::Processing;
                entry.started_at = Some(now);
                QueuedJob {
                    id: entry.id,
                    job: entry.job.clone(),
                    attempts: entry.attempts,
                }
            })
            .collect())
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(QueueError::NotFound(id))?;
        entry.status = EntryStatus::Completed;
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<bool, QueueError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(QueueError::NotFound(id))?;

        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        if entry.attempts >= DEFAULT_MAX_ATTEMPTS {
            entry.status = EntryStatus::Failed;
            Ok(false)
        } else {
            entry.status = EntryStatus::Pending;
            entry.run_at = Utc::now() + calculate_backoff(entry.attempts);
            Ok(true)
        }
    }

    async fn reschedule(&self, id: JobId, job: Job, run_at: DateTime<Utc>) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(QueueError::NotFound(id))?;
        entry.job = job;
        entry.status = EntryStatus::Pending;
        entry.run_at = run_at;
        entry.started_at = None;
        Ok(())
    }

    async fn recover_stale(&self, before: DateTime<Utc>) -> Result<u64, QueueError> {
        let mut entries = self.entries.lock().await;
        let mut recovered = 0;
        for entry in entries.iter_mut() {
            if entry.status == EntryStatus::Processing
                && entry.started_at.map_or(true, |at| at < before)
            {
                entry.status = EntryStatus::Pending;
                entry.started_at = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_dedupe_while_live() {
        let queue = MemoryJobQueue::new();
        let campaign = Uuid::now_v7();

        let first = queue
            .enqueue(Job::sequence_advance(campaign), Utc::now())
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(queue
            .enqueue(Job::sequence_advance(campaign), Utc::now())
            .await
            .unwrap()
            .is_none());

        let claimed = queue.claim(JobCategory::SequenceAdvance, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        queue.complete(claimed[0].id).await.unwrap();

        // A finished job no longer blocks the key
        assert!(queue
            .enqueue(Job::sequence_advance(campaign), Utc::now())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_claim_respects_category_and_schedule() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(Job::warmup(Uuid::now_v7()), Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        queue
            .enqueue(Job::sequence_advance(Uuid::now_v7()), Utc::now())
            .await
            .unwrap();

        assert!(queue.claim(JobCategory::Warmup, 10).await.unwrap().is_empty());
        assert_eq!(queue.claim(JobCategory::SequenceAdvance, 10).await.unwrap().len(), 1);
        // Claimed jobs are not handed out twice
        assert!(queue.claim(JobCategory::SequenceAdvance, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_retries_then_gives_up() {
        let queue = MemoryJobQueue::new();
        let id = queue
            .enqueue(Job::warmup(Uuid::now_v7()), Utc::now())
            .await
            .unwrap()
            .unwrap();

        for attempt in 1..=DEFAULT_MAX_ATTEMPTS {
            queue.make_due().await;
            let claimed = queue.claim(JobCategory::Warmup, 1).await.unwrap();
            assert_eq!(claimed[0].attempts, attempt - 1);
            let retry = queue.fail(id, "boom").await.unwrap();
            assert_eq!(retry, attempt < DEFAULT_MAX_ATTEMPTS);
        }

        queue.make_due().await;
        assert!(queue.claim(JobCategory::Warmup, 1).await.unwrap().is_empty());
        assert_eq!(queue.last_error(id).await.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_recover_stale_claims() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(Job::sequence_advance(Uuid::now_v7()), Utc::now())
            .await
            .unwrap();
        queue.claim(JobCategory::SequenceAdvance, 1).await.unwrap();

        let recovered = queue
            .recover_stale(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(queue.claim(JobCategory::SequenceAdvance, 1).await.unwrap().len(), 1);
    }
}
