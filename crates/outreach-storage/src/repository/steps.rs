//! Campaign step repository

use crate::db::DatabasePool;
use crate::models::{CampaignStep, CreateCampaignStep, StepCounter};
use crate::repository::db_err;
use async_trait::async_trait;
use outreach_common::types::{CampaignId, StepId};
use outreach_common::{Error, Result};
use uuid::Uuid;

/// Campaign step repository trait
#[async_trait]
pub trait StepRepository: Send + Sync {
    async fn create(&self, input: CreateCampaignStep) -> Result<CampaignStep>;
    /// Steps ordered by step number
    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignStep>>;
    async fn increment_counter(&self, id: StepId, counter: StepCounter) -> Result<()>;
}

/// Database step repository
pub struct DbStepRepository {
    pool: DatabasePool,
}

impl DbStepRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StepRepository for DbStepRepository {
    async fn create(&self, input: CreateCampaignStep) -> Result<CampaignStep> {
        let conditions = serde_json::to_value(&input.conditions)
            .map_err(|e| Error::Validation(e.to_string()))?;

        sqlx::query_as::<_, CampaignStep>(
            r#"
            INSERT INTO campaign_steps (
                id, campaign_id, step_number, channel, delay_days, delay_hours,
                subject, body, action, conditions
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.campaign_id)
        .bind(input.step_number)
        .bind(input.channel.to_string())
        .bind(input.delay_days)
        .bind(input.delay_hours)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.action.map(|a| a.to_string()))
        .bind(&conditions)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignStep>> {
        sqlx::query_as::<_, CampaignStep>(
            "SELECT * FROM campaign_steps WHERE campaign_id = $1 ORDER BY step_number ASC",
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn increment_counter(&self, id: StepId, counter: StepCounter) -> Result<()> {
        let column = counter.column();
        sqlx::query(&format!(
            "UPDATE campaign_steps SET {column} = {column} + 1 WHERE id = $1"
        ))
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
