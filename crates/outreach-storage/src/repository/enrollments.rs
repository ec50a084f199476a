//! Campaign contact (enrollment) repository

use crate::db::DatabasePool;
use crate::models::{CampaignContact, CreateCampaignContact, StepTransition};
use crate::repository::db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, ContactId, EnrollmentId};
use outreach_common::Result;
use uuid::Uuid;

/// Enrollment repository trait
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Create the enrollment, or return the existing one for the pair
    async fn create(&self, input: CreateCampaignContact) -> Result<CampaignContact>;
    async fn get(&self, id: EnrollmentId) -> Result<Option<CampaignContact>>;
    async fn get_by_pair(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Option<CampaignContact>>;
    /// Active enrollments with `next_action_at <= now`, oldest first
    async fn list_due(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CampaignContact>>;
    /// Apply a step transition if the enrollment is still active at `expected_step`
    async fn apply_transition(
        &self,
        id: EnrollmentId,
        expected_step: i32,
        transition: StepTransition,
    ) -> Result<bool>;
    /// Stamp a successful send; returns true on the first contact. Clears the error streak.
    async fn record_contacted(&self, id: EnrollmentId, at: DateTime<Utc>) -> Result<bool>;
    /// Returns the new consecutive error count
    async fn record_error(&self, id: EnrollmentId, error: &str) -> Result<i32>;
    async fn deactivate(&self, id: EnrollmentId) -> Result<bool>;
    /// Deactivate every membership of a contact across all campaigns
    async fn deactivate_for_contact(&self, contact_id: ContactId) -> Result<u64>;
    async fn count_active(&self, campaign_id: CampaignId) -> Result<i64>;
    /// All enrollments of a campaign, active or not
    async fn count_all(&self, campaign_id: CampaignId) -> Result<i64>;
    async fn delete(&self, campaign_id: CampaignId, contact_id: ContactId) -> Result<bool>;
}

/// Database enrollment repository
pub struct DbEnrollmentRepository {
    pool: DatabasePool,
}

impl DbEnrollmentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentRepository for DbEnrollmentRepository {
    async fn create(&self, input: CreateCampaignContact) -> Result<CampaignContact> {
        sqlx::query(
            r#"
            INSERT INTO campaign_contacts (
                id, campaign_id, contact_id, current_step, next_action_at, is_active, variables
            )
            VALUES ($1, $2, $3, 0, $4, TRUE, $5)
            ON CONFLICT (campaign_id, contact_id) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.campaign_id)
        .bind(input.contact_id)
        .bind(input.next_action_at)
        .bind(input.variables.unwrap_or_else(|| serde_json::json!({})))
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        self.get_by_pair(input.campaign_id, input.contact_id)
            .await?
            .ok_or_else(|| outreach_common::Error::Internal("Failed to create enrollment".to_string()))
    }

    async fn get(&self, id: EnrollmentId) -> Result<Option<CampaignContact>> {
        sqlx::query_as::<_, CampaignContact>("SELECT * FROM campaign_contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn get_by_pair(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Option<CampaignContact>> {
        sqlx::query_as::<_, CampaignContact>(
            "SELECT * FROM campaign_contacts WHERE campaign_id = $1 AND contact_id = $2",
        )
        .bind(campaign_id)
        .bind(contact_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn list_due(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CampaignContact>> {
        sqlx::query_as::<_, CampaignContact>(
            r#"
            SELECT * FROM campaign_contacts
            WHERE campaign_id = $1
              AND is_active = TRUE
              AND next_action_at IS NOT NULL
              AND next_action_at <= $2
            ORDER BY next_action_at ASC, id ASC
            LIMIT $3
            "#,
        )
        .bind(campaign_id)
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn apply_transition(
        &self,
        id: EnrollmentId,
        expected_step: i32,
        transition: StepTransition,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_contacts SET
                current_step = $3,
                next_action_at = $4,
                is_active = $5,
                updated_at = NOW()
            WHERE id = $1 AND current_step = $2 AND is_active = TRUE
            "#,
        )
        .bind(id)
        .bind(expected_step)
        .bind(transition.current_step)
        .bind(transition.next_action_at)
        .bind(transition.is_active)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_contacted(&self, id: EnrollmentId, at: DateTime<Utc>) -> Result<bool> {
        let first: Option<(bool,)> = sqlx::query_as(
            r#"
            WITH prev AS (
                SELECT id, first_contacted_at FROM campaign_contacts WHERE id = $1 FOR UPDATE
            )
            UPDATE campaign_contacts c SET
                first_contacted_at = COALESCE(c.first_contacted_at, $2),
                last_contacted_at = $2,
                error_count = 0,
                last_error = NULL,
                updated_at = NOW()
            FROM prev
            WHERE c.id = prev.id
            RETURNING prev.first_contacted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(first.map_or(false, |(f,)| f))
    }

    async fn record_error(&self, id: EnrollmentId, error: &str) -> Result<i32> {
        let count: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE campaign_contacts SET
                error_count = error_count + 1,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING error_count
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(count.map_or(0, |(c,)| c))
    }

    async fn deactivate(&self, id: EnrollmentId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaign_contacts SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_for_contact(&self, contact_id: ContactId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE campaign_contacts SET is_active = FALSE, updated_at = NOW() WHERE contact_id = $1 AND is_active = TRUE",
        )
        .bind(contact_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn count_active(&self, campaign_id: CampaignId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1 AND is_active = TRUE",
        )
        .bind(campaign_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(count.0)
    }

    async fn count_all(&self, campaign_id: CampaignId) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1")
                .bind(campaign_id)
                .fetch_one(self.pool.pool())
                .await
                .map_err(db_err)?;

        Ok(count.0)
    }

    async fn delete(&self, campaign_id: CampaignId, contact_id: ContactId) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM campaign_contacts WHERE campaign_id = $1 AND contact_id = $2",
        )
        .bind(campaign_id)
        .bind(contact_id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}
