//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignCounter, CampaignStatus, CreateCampaign};
use crate::repository::db_err;
use async_trait::async_trait;
use outreach_common::types::CampaignId;
use outreach_common::{Error, Result};
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;
    /// Move to `to` only if the current status is one of `from`
    async fn transition_status(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool>;
    async fn increment_counter(&self, id: CampaignId, counter: CampaignCounter) -> Result<()>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let id = Uuid::now_v7();
        let days = serde_json::to_value(&input.schedule.days)
            .map_err(|e| Error::Validation(e.to_string()))?;

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, organization_id, name, channel, status, timezone,
                sending_days, start_hour, end_hour
            )
            VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.organization_id)
        .bind(&input.name)
        .bind(input.channel.to_string())
        .bind(&input.schedule.timezone)
        .bind(&days)
        .bind(input.schedule.start_hour as i32)
        .bind(input.schedule.end_hour as i32)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn transition_status(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool> {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = $2,
                started_at = CASE WHEN $2 = 'active' THEN COALESCE(started_at, NOW()) ELSE started_at END,
                completed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to.to_string())
        .bind(&from)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_counter(&self, id: CampaignId, counter: CampaignCounter) -> Result<()> {
        let column = counter.column();
        sqlx::query(&format!(
            "UPDATE campaigns SET {column} = {column} + 1, updated_at = NOW() WHERE id = $1"
        ))
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
