//! Sending account repository

use crate::db::DatabasePool;
use crate::models::{AccountStatus, CreateSendingAccount, Reputation, SendingAccount, WarmupUpdate};
use crate::repository::db_err;
use async_trait::async_trait;
use outreach_common::types::{AccountId, Channel, OrganizationId};
use outreach_common::Result;
use uuid::Uuid;

/// Sending account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, input: CreateSendingAccount) -> Result<SendingAccount>;
    async fn get(&self, id: AccountId) -> Result<Option<SendingAccount>>;
    /// Active, non-blocked accounts below their daily limit, in a stable order
    async fn list_eligible(
        &self,
        organization_id: OrganizationId,
        channel: Channel,
    ) -> Result<Vec<SendingAccount>>;
    async fn list_by_status(&self, status: AccountStatus) -> Result<Vec<SendingAccount>>;
    /// Increment `sent_today` only while it is below `daily_limit`
    async fn try_increment_sent_today(&self, id: AccountId) -> Result<bool>;
    /// Daily rollover
    async fn reset_sent_today(&self) -> Result<u64>;
    /// Record a finished warmup day; false when that date was already recorded
    async fn update_warmup(&self, id: AccountId, update: WarmupUpdate) -> Result<bool>;
    async fn update_reputation(&self, id: AccountId, reputation: Reputation) -> Result<()>;
}

/// Database sending account repository
pub struct DbAccountRepository {
    pool: DatabasePool,
}

impl DbAccountRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for DbAccountRepository {
    async fn create(&self, input: CreateSendingAccount) -> Result<SendingAccount> {
        sqlx::query_as::<_, SendingAccount>(
            r#"
            INSERT INTO sending_accounts (
                id, organization_id, channel, email, display_name, smtp_host, smtp_port,
                smtp_username, smtp_password, daily_limit, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.organization_id)
        .bind(input.channel.to_string())
        .bind(&input.email)
        .bind(&input.display_name)
        .bind(&input.smtp_host)
        .bind(input.smtp_port)
        .bind(&input.smtp_username)
        .bind(&input.smtp_password)
        .bind(input.daily_limit)
        .bind(input.status.to_string())
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn get(&self, id: AccountId) -> Result<Option<SendingAccount>> {
        sqlx::query_as::<_, SendingAccount>("SELECT * FROM sending_accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn list_eligible(
        &self,
        organization_id: OrganizationId,
        channel: Channel,
    ) -> Result<Vec<SendingAccount>> {
        sqlx::query_as::<_, SendingAccount>(
            r#"
            SELECT * FROM sending_accounts
            WHERE organization_id = $1
              AND channel = $2
              AND is_active = TRUE
              AND status <> 'blocked'
              AND sent_today < daily_limit
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(organization_id)
        .bind(channel.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn list_by_status(&self, status: AccountStatus) -> Result<Vec<SendingAccount>> {
        sqlx::query_as::<_, SendingAccount>(
            "SELECT * FROM sending_accounts WHERE status = $1 AND is_active = TRUE ORDER BY created_at ASC, id ASC",
        )
        .bind(status.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn try_increment_sent_today(&self, id: AccountId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sending_accounts SET sent_today = sent_today + 1, updated_at = NOW()
            WHERE id = $1 AND sent_today < daily_limit
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_sent_today(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sending_accounts SET sent_today = 0, updated_at = NOW() WHERE sent_today <> 0",
        )
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn update_warmup(&self, id: AccountId, update: WarmupUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sending_accounts SET
                warmup_day = $2,
                daily_limit = $3,
                status = $4,
                last_warmup_on = $5,
                updated_at = NOW()
            WHERE id = $1
              AND (last_warmup_on IS NULL OR last_warmup_on < $5)
            "#,
        )
        .bind(id)
        .bind(update.warmup_day)
        .bind(update.daily_limit)
        .bind(update.status.to_string())
        .bind(update.day)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_reputation(&self, id: AccountId, reputation: Reputation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sending_accounts SET
                health_score = $2,
                delivery_rate = $3,
                bounce_rate = $4,
                reply_rate = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(reputation.health_score)
        .bind(reputation.delivery_rate)
        .bind(reputation.bounce_rate)
        .bind(reputation.reply_rate)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
