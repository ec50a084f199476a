//! Contact repository

use crate::db::DatabasePool;
use crate::models::{Contact, ContactStatus, CreateContact, EngagementCounter};
use crate::repository::db_err;
use async_trait::async_trait;
use outreach_common::types::ContactId;
use outreach_common::Result;
use uuid::Uuid;

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn create(&self, input: CreateContact) -> Result<Contact>;
    async fn get(&self, id: ContactId) -> Result<Option<Contact>>;
    /// Case-insensitive lookup across organizations
    async fn find_by_email(&self, email: &str) -> Result<Vec<Contact>>;
    /// Move an active contact to a terminal status; false if it already left `active`
    async fn mark_terminal(&self, id: ContactId, status: ContactStatus) -> Result<bool>;
    async fn increment_engagement(&self, id: ContactId, counter: EngagementCounter) -> Result<()>;
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn create(&self, input: CreateContact) -> Result<Contact> {
        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (
                id, organization_id, email, first_name, last_name, company,
                title, linkedin_url, status, attributes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.organization_id)
        .bind(input.email.trim())
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.company)
        .bind(&input.title)
        .bind(&input.linkedin_url)
        .bind(input.attributes.unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(self.pool.pool())
        .await
        .map_err(db_err)
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE LOWER(email) = LOWER($1)")
            .bind(email.trim())
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_err)
    }

    async fn mark_terminal(&self, id: ContactId, status: ContactStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE contacts SET status = $2, updated_at = NOW() WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(status.to_string())
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_engagement(&self, id: ContactId, counter: EngagementCounter) -> Result<()> {
        let column = counter.column();
        sqlx::query(&format!(
            "UPDATE contacts SET {column} = {column} + 1, updated_at = NOW() WHERE id = $1"
        ))
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
