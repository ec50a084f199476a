//! Warmup log repository

use crate::db::DatabasePool;
use crate::models::{WarmupLog, WarmupLogDelta};
use crate::repository::db_err;
use async_trait::async_trait;
use chrono::NaiveDate;
use outreach_common::types::AccountId;
use outreach_common::Result;
use uuid::Uuid;

/// Warmup log repository trait
#[async_trait]
pub trait WarmupLogRepository: Send + Sync {
    /// Add `delta` to the (account, day) row, creating it if needed
    async fn upsert_increment(
        &self,
        account_id: AccountId,
        day: NaiveDate,
        delta: WarmupLogDelta,
    ) -> Result<WarmupLog>;
    async fn set_health_score(&self, account_id: AccountId, day: NaiveDate, score: f64) -> Result<()>;
    /// Rows with `log_date >= since`, oldest first
    async fn list_since(&self, account_id: AccountId, since: NaiveDate) -> Result<Vec<WarmupLog>>;
}

/// Database warmup log repository
pub struct DbWarmupLogRepository {
    pool: DatabasePool,
}

impl DbWarmupLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WarmupLogRepository for DbWarmupLogRepository {
    async fn upsert_increment(
        &self,
        account_id: AccountId,
        day: NaiveDate,
        delta: WarmupLogDelta,
    ) -> Result<WarmupLog> {
        sqlx::query_as::<_, WarmupLog>(
            r#"
            INSERT INTO warmup_logs (
                id, account_id, log_date, emails_sent, emails_received,
                bounces, spam_reports, replies_sent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (account_id, log_date) DO UPDATE SET
                emails_sent = warmup_logs.emails_sent + EXCLUDED.emails_sent,
                emails_received = warmup_logs.emails_received + EXCLUDED.emails_received,
                bounces = warmup_logs.bounces + EXCLUDED.bounces,
                spam_reports = warmup_logs.spam_reports + EXCLUDED.spam_reports,
                replies_sent = warmup_logs.replies_sent + EXCLUDED.replies_sent,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(account_id)
        .bind(day)
        .bind(delta.emails_sent)
        .bind(delta.emails_received)
        .bind(delta.bounces)
        .bind(delta.spam_reports)
        .bind(delta.replies_sent)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn set_health_score(&self, account_id: AccountId, day: NaiveDate, score: f64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO warmup_logs (id, account_id, log_date, health_score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id, log_date) DO UPDATE SET
                health_score = EXCLUDED.health_score,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(account_id)
        .bind(day)
        .bind(score)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_since(&self, account_id: AccountId, since: NaiveDate) -> Result<Vec<WarmupLog>> {
        sqlx::query_as::<_, WarmupLog>(
            "SELECT * FROM warmup_logs WHERE account_id = $1 AND log_date >= $2 ORDER BY log_date ASC",
        )
        .bind(account_id)
        .bind(since)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }
}
