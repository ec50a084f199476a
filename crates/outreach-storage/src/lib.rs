//! Outreach Storage - Persistence for campaigns, contacts, accounts and messages
//!
//! Every entity is reached through a repository trait with a PostgreSQL
//! implementation and an in-memory implementation used by tests and the
//! `memory` backend.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::{Database, DatabasePool};
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
