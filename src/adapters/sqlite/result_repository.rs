//! SQLite implementation of the ResultRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{InstanceKey, StepDetail, TestInstance};
use crate::domain::ports::{ResultRepository, StatusCount};

#[derive(Clone)]
pub struct SqliteResultRepository {
    pool: SqlitePool,
}

impl SqliteResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultRepository for SqliteResultRepository {
    async fn get_instance(&self, key: &InstanceKey) -> DomainResult<Option<TestInstance>> {
        let row: Option<InstanceRow> = sqlx::query_as(
            r#"SELECT * FROM test_instances
               WHERE run_id = ? AND persona_id = ? AND scenario_id = ? AND mode = ?"#,
        )
        .bind(&key.run_id)
        .bind(&key.persona_id)
        .bind(&key.scenario_id)
        .bind(key.mode.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn insert_instance(&self, instance: &TestInstance, details: &[StepDetail]) -> DomainResult<bool> {
        let write_failure = |e: sqlx::Error| DomainError::PersistenceWriteFailure(e.to_string());
        let mut tx = self.pool.begin().await.map_err(write_failure)?;

        let inserted = sqlx::query(
            r#"INSERT INTO test_instances (id, run_id, persona_id, scenario_id, mode, status,
               steps_total, steps_completed, steps_failed, score, error_message, started_at, finished_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(run_id, persona_id, scenario_id, mode) DO NOTHING"#,
        )
        .bind(instance.id.to_string())
        .bind(&instance.key.run_id)
        .bind(&instance.key.persona_id)
        .bind(&instance.key.scenario_id)
        .bind(instance.key.mode.as_str())
        .bind(instance.status.as_str())
        .bind(instance.steps_total as i64)
        .bind(instance.steps_completed as i64)
        .bind(instance.steps_failed as i64)
        .bind(instance.score)
        .bind(&instance.error_message)
        .bind(instance.started_at.to_rfc3339())
        .bind(instance.finished_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(write_failure)?
        .rows_affected()
            > 0;

        if !inserted {
            tx.rollback().await.map_err(write_failure)?;
            return Ok(false);
        }

        for (position, detail) in details.iter().enumerate() {
            let kind = match detail {
                StepDetail::Scripted(_) => "scripted",
                StepDetail::Exploratory(_) => "exploratory",
            };
            let detail_json = serde_json::to_string(detail)?;

            sqlx::query(
                "INSERT INTO step_details (instance_id, position, kind, status, detail) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(instance.id.to_string())
            .bind(position as i64)
            .bind(kind)
            .bind(detail.status().as_str())
            .bind(&detail_json)
            .execute(&mut *tx)
            .await
            .map_err(write_failure)?;
        }

        tx.commit().await.map_err(write_failure)?;
        Ok(true)
    }

    async fn list_by_run(&self, run_id: &str) -> DomainResult<Vec<TestInstance>> {
        let rows: Vec<InstanceRow> = sqlx::query_as(
            "SELECT * FROM test_instances WHERE run_id = ? ORDER BY persona_id, scenario_id, mode",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_failures(&self, run_id: &str) -> DomainResult<Vec<TestInstance>> {
        let rows: Vec<InstanceRow> = sqlx::query_as(
            r#"SELECT * FROM test_instances WHERE run_id = ? AND status != 'pass'
               ORDER BY scenario_id, persona_id, mode"#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn get_details(&self, instance_id: Uuid) -> DomainResult<Vec<StepDetail>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT detail FROM step_details WHERE instance_id = ? ORDER BY position")
                .bind(instance_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(detail,)| serde_json::from_str(&detail).map_err(DomainError::from))
            .collect()
    }

    async fn count_by_status(&self, run_id: &str) -> DomainResult<Vec<StatusCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM test_instances WHERE run_id = ? GROUP BY status ORDER BY status",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| {
                Ok(StatusCount {
                    status: super::parse_status(&status)?,
                    count: count.max(0) as u64,
                })
            })
            .collect()
    }

    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT run_id FROM test_instances GROUP BY run_id ORDER BY MAX(finished_at) DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: String,
    run_id: String,
    persona_id: String,
    scenario_id: String,
    mode: String,
    status: String,
    steps_total: i64,
    steps_completed: i64,
    steps_failed: i64,
    score: Option<f64>,
    error_message: Option<String>,
    started_at: String,
    finished_at: String,
}

impl TryFrom<InstanceRow> for TestInstance {
    type Error = DomainError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(TestInstance {
            id: super::parse_uuid(&row.id)?,
            key: InstanceKey {
                run_id: row.run_id,
                persona_id: row.persona_id,
                scenario_id: row.scenario_id,
                mode: super::parse_mode(&row.mode)?,
            },
            status: super::parse_status(&row.status)?,
            steps_total: row.steps_total as u32,
            steps_completed: row.steps_completed as u32,
            steps_failed: row.steps_failed as u32,
            score: row.score,
            error_message: row.error_message,
            started_at: super::parse_datetime(&row.started_at)?,
            finished_at: super::parse_datetime(&row.finished_at)?,
        })
    }
}
