//! SQLite database adapters for fixloop.

pub mod connection;
pub mod metrics_repository;
pub mod migrations;
pub mod result_repository;
pub mod roster_repository;
pub mod unfixable_repository;

pub use connection::{create_pool, create_test_pool, database_url, verify_connection, ConnectionError, PoolConfig};
pub use metrics_repository::SqliteMetricsRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use result_repository::SqliteResultRepository;
pub use roster_repository::SqliteRosterRepository;
pub use unfixable_repository::SqliteUnfixableRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DatabaseConfig, OverallStatus, ScenarioMode};

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_mode(s: &str) -> DomainResult<ScenarioMode> {
    ScenarioMode::from_str(s).ok_or_else(|| DomainError::SerializationError(format!("Invalid mode: {s}")))
}

pub fn parse_status(s: &str) -> DomainResult<OverallStatus> {
    OverallStatus::from_str(s).ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {s}")))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(&database_url(&config.path), Some(PoolConfig::from(config))).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
