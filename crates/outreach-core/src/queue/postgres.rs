//! PostgreSQL queue backend on the `jobs` table

use super::{calculate_backoff, Job, JobCategory, JobQueue, QueueError, QueuedJob, DEFAULT_MAX_ATTEMPTS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::JobId;
use outreach_storage::db::DatabasePool;
use outreach_storage::models::Job as JobRow;
use tracing::{error, info};
use uuid::Uuid;

/// Queue persisted in PostgreSQL; claims use `FOR UPDATE SKIP LOCKED`
#[derive(Clone)]
pub struct PgJobQueue {
    pool: DatabasePool,
}

impl PgJobQueue {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn mark_failed(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $2, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: Job, run_at: DateTime<Utc>) -> Result<Option<JobId>, QueueError> {
        let payload = serde_json::to_value(&job)?;
        let id: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO jobs (id, queue, payload, dedupe_key, status, attempts, max_attempts, scheduled_at, created_at)
            VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6, NOW())
            ON CONFLICT (dedupe_key) WHERE status IN ('pending', 'processing') DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(job.category().as_str())
        .bind(&payload)
        .bind(job.dedupe_key())
        .bind(DEFAULT_MAX_ATTEMPTS)
        .bind(run_at)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(id.map(|(id,)| id))
    }

    async fn claim(&self, category: JobCategory, limit: usize) -> Result<Vec<QueuedJob>, QueueError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs
            SET status = 'processing', started_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending'
                AND queue = $1
                AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(category.as_str())
        .bind(limit as i64)
        .fetch_all(self.pool.pool())
        .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<Job>(row.payload) {
                Ok(job) => claimed.push(QueuedJob {
                    id: row.id,
                    job,
                    attempts: row.attempts,
                }),
                Err(e) => {
                    error!(job_id = %row.id, "Failed to parse job payload: {}", e);
                    self.mark_failed(row.id, &e.to_string()).await?;
                }
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<bool, QueueError> {
        let row: Option<(i32, i32)> =
            sqlx::query_as("SELECT attempts, max_attempts FROM jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.pool())
                .await?;
        let (attempts, max_attempts) = row.ok_or(QueueError::NotFound(id))?;

        let attempts = attempts + 1;
        if attempts >= max_attempts {
            error!(job_id = %id, "Job exceeded max attempts, marking as failed");
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed', attempts = $2, last_error = $3, completed_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(attempts)
            .bind(error)
            .execute(self.pool.pool())
            .await?;
            return Ok(false);
        }

        let scheduled_at = Utc::now() + calculate_backoff(attempts);
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                attempts = $2,
                last_error = $3,
                scheduled_at = $4,
                started_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .bind(scheduled_at)
        .execute(self.pool.pool())
        .await?;

        info!(job_id = %id, "Job scheduled for retry at {} (attempt {})", scheduled_at, attempts + 1);
        Ok(true)
    }

    async fn reschedule(&self, id: JobId, job: Job, run_at: DateTime<Utc>) -> Result<(), QueueError> {
        let payload = serde_json::to_value(&job)?;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', payload = $2, scheduled_at = $3, started_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&payload)
        .bind(run_at)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn recover_stale(&self, before: DateTime<Utc>) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending', started_at = NULL
            WHERE status = 'processing' AND started_at < $1
            "#,
        )
        .bind(before)
        .execute(self.pool.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
