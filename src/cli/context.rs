//! Store wiring shared by the commands.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::sqlite::{
    initialize_database, SqliteMetricsRepository, SqliteResultRepository, SqliteRosterRepository,
    SqliteUnfixableRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::{MetricsRepository, ResultRepository, RosterRepository, UnfixableRepository};

/// Loaded configuration plus the repositories behind one pool.
pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub roster: Arc<dyn RosterRepository>,
    pub results: Arc<dyn ResultRepository>,
    pub unfixable: Arc<dyn UnfixableRepository>,
    pub metrics: Arc<dyn MetricsRepository>,
}

impl AppContext {
    /// Open (and migrate) the configured database.
    pub async fn open(config: Config) -> Result<Self> {
        if let Some(parent) = Path::new(&config.database.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }
        let pool = initialize_database(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;
        Ok(Self::with_pool(config, pool))
    }

    pub fn with_pool(config: Config, pool: SqlitePool) -> Self {
        Self {
            roster: Arc::new(SqliteRosterRepository::new(pool.clone())),
            results: Arc::new(SqliteResultRepository::new(pool.clone())),
            unfixable: Arc::new(SqliteUnfixableRepository::new(pool.clone())),
            metrics: Arc::new(SqliteMetricsRepository::new(pool.clone())),
            config,
            pool,
        }
    }
}
