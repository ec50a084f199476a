//! Repository layer for data access

pub mod accounts;
pub mod campaigns;
pub mod contacts;
pub mod enrollments;
pub mod messages;
pub mod steps;
pub mod warmup_logs;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use outreach_common::{Error, Result};
use std::sync::Arc;

pub use accounts::{AccountRepository, DbAccountRepository};
pub use campaigns::{CampaignRepository, DbCampaignRepository};
pub use contacts::{ContactRepository, DbContactRepository};
pub use enrollments::{DbEnrollmentRepository, EnrollmentRepository};
pub use messages::{DbMessageRepository, MessageRepository};
pub use steps::{DbStepRepository, StepRepository};
pub use warmup_logs::{DbWarmupLogRepository, WarmupLogRepository};

/// Map a sqlx error, surfacing unique violations as conflicts
pub(crate) fn db_err(e: sqlx::Error) -> Error {
    if let Some(db) = e.as_database_error() {
        if db.code().as_deref() == Some("23505") {
            return Error::Conflict(db.message().to_string());
        }
    }
    Error::Database(e.to_string())
}

/// All repositories the engine needs, behind trait objects
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub steps: Arc<dyn StepRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub warmup_logs: Arc<dyn WarmupLogRepository>,
    pool: Option<DatabasePool>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            steps: Arc::new(DbStepRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            enrollments: Arc::new(DbEnrollmentRepository::new(pool.clone())),
            accounts: Arc::new(DbAccountRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool.clone())),
            warmup_logs: Arc::new(DbWarmupLogRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repositories backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    /// Repositories backed by an existing in-memory store
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            campaigns: store.clone(),
            steps: store.clone(),
            contacts: store.clone(),
            enrollments: store.clone(),
            accounts: store.clone(),
            messages: store.clone(),
            warmup_logs: store,
            pool: None,
        }
    }

    /// Underlying pool, when backed by PostgreSQL
    pub fn pool(&self) -> Option<&DatabasePool> {
        self.pool.as_ref()
    }

    /// Readiness check: pings the database if there is one
    pub async fn health_check(&self) -> Result<()> {
        match &self.pool {
            Some(pool) => pool.health_check().await,
            None => Ok(()),
        }
    }
}
