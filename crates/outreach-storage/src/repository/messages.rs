//! Message repository

use crate::db::DatabasePool;
use crate::models::{ClickRecord, CreateMessage, Message, OpenRecord, TransitionRecord};
use crate::repository::db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, ContactId, MessageId};
use outreach_common::Result;
use uuid::Uuid;

/// Message repository trait
///
/// The `record_*` methods are atomic: the returned flag tells whether this call
/// was the one that set the corresponding first-occurrence timestamp.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, input: CreateMessage) -> Result<Message>;
    async fn get(&self, id: MessageId) -> Result<Option<Message>>;
    async fn get_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Message>>;
    async fn get_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>>;
    /// Message history of one enrollment, oldest first
    async fn list_for_enrollment(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Vec<Message>>;
    async fn record_open(&self, tracking_id: &str, at: DateTime<Utc>) -> Result<Option<OpenRecord>>;
    async fn record_click(
        &self,
        tracking_id: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ClickRecord>>;
    async fn record_reply(
        &self,
        tracking_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<TransitionRecord>>;
    async fn record_bounce(&self, id: MessageId, at: DateTime<Utc>) -> Result<Option<TransitionRecord>>;
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, tracking_id, campaign_id, step_id, contact_id, account_id, channel,
                subject, provider_message_id, status, error, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&input.tracking_id)
        .bind(input.campaign_id)
        .bind(input.step_id)
        .bind(input.contact_id)
        .bind(input.account_id)
        .bind(input.channel.to_string())
        .bind(&input.subject)
        .bind(&input.provider_message_id)
        .bind(input.status.to_string())
        .bind(&input.error)
        .bind(input.sent_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn get_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE tracking_id = $1")
            .bind(tracking_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn get_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE provider_message_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(provider_message_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn list_for_enrollment(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE campaign_id = $1 AND contact_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn record_open(&self, tracking_id: &str, at: DateTime<Utc>) -> Result<Option<OpenRecord>> {
        sqlx::query_as::<_, OpenRecord>(
            r#"
            WITH prev AS (
                SELECT id, opened_at FROM messages WHERE tracking_id = $1 FOR UPDATE
            )
            UPDATE messages m SET
                opens_count = m.opens_count + 1,
                opened_at = COALESCE(m.opened_at, $2),
                status = CASE WHEN m.status IN ('sent', 'delivered') THEN 'opened' ELSE m.status END,
                updated_at = NOW()
            FROM prev
            WHERE m.id = prev.id
            RETURNING m.*, (prev.opened_at IS NULL) AS first_open
            "#,
        )
        .bind(tracking_id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn record_click(
        &self,
        tracking_id: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ClickRecord>> {
        sqlx::query_as::<_, ClickRecord>(
            r#"
            WITH prev AS (
                SELECT id, clicked_at FROM messages WHERE tracking_id = $1 FOR UPDATE
            )
            UPDATE messages m SET
                clicks_count = m.clicks_count + 1,
                clicked_at = COALESCE(m.clicked_at, $3),
                clicked_links = CASE
                    WHEN $2 = ANY(m.clicked_links) THEN m.clicked_links
                    ELSE array_append(m.clicked_links, $2)
                END,
                status = CASE
                    WHEN m.status IN ('sent', 'delivered', 'opened') THEN 'clicked'
                    ELSE m.status
                END,
                updated_at = NOW()
            FROM prev
            WHERE m.id = prev.id
            RETURNING m.*, (prev.clicked_at IS NULL) AS first_click
            "#,
        )
        .bind(tracking_id)
        .bind(url)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn record_reply(
        &self,
        tracking_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<TransitionRecord>> {
        sqlx::query_as::<_, TransitionRecord>(
            r#"
            WITH prev AS (
                SELECT id, replied_at FROM messages WHERE tracking_id = $1 FOR UPDATE
            )
            UPDATE messages m SET
                replied_at = COALESCE(m.replied_at, $2),
                status = CASE WHEN m.status IN ('bounced', 'failed') THEN m.status ELSE 'replied' END,
                updated_at = NOW()
            FROM prev
            WHERE m.id = prev.id
            RETURNING m.*, (prev.replied_at IS NULL) AS first_time
            "#,
        )
        .bind(tracking_id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn record_bounce(&self, id: MessageId, at: DateTime<Utc>) -> Result<Option<TransitionRecord>> {
        sqlx::query_as::<_, TransitionRecord>(
            r#"
            WITH prev AS (
                SELECT id, bounced_at FROM messages WHERE id = $1 FOR UPDATE
            )
            UPDATE messages m SET
                bounced_at = COALESCE(m.bounced_at, $2),
                status = 'bounced',
                updated_at = NOW()
            FROM prev
            WHERE m.id = prev.id
            RETURNING m.*, (prev.bounced_at IS NULL) AS first_time
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_err)
    }
}
