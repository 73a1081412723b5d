//! SQLite implementation of the MetricsRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::MetricsPoint;
use crate::domain::ports::MetricsRepository;

#[derive(Clone)]
pub struct SqliteMetricsRepository {
    pool: SqlitePool,
}

impl SqliteMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsRepository for SqliteMetricsRepository {
    async fn append(&self, loop_id: &str, point: &MetricsPoint) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO metrics_history (loop_id, iteration, pass_count, avg_score, recorded_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(loop_id, iteration) DO NOTHING"#,
        )
        .bind(loop_id)
        .bind(point.iteration as i64)
        .bind(point.pass_count as i64)
        .bind(point.avg_score)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::PersistenceWriteFailure(e.to_string()))?;

        Ok(())
    }

    async fn history(&self, loop_id: &str) -> DomainResult<Vec<MetricsPoint>> {
        let rows: Vec<(i64, i64, f64)> = sqlx::query_as(
            "SELECT iteration, pass_count, avg_score FROM metrics_history WHERE loop_id = ? ORDER BY iteration",
        )
        .bind(loop_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(iteration, pass_count, avg_score)| {
                MetricsPoint::new(iteration as u32, pass_count as u32, avg_score)
            })
            .collect())
    }

    async fn list_loops(&self) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT loop_id FROM metrics_history GROUP BY loop_id ORDER BY MAX(recorded_at) DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
