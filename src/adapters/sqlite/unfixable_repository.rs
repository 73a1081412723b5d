//! SQLite implementation of the UnfixableRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ScenarioMode, UnfixableItem};
use crate::domain::ports::UnfixableRepository;

#[derive(Clone)]
pub struct SqliteUnfixableRepository {
    pool: SqlitePool,
}

impl SqliteUnfixableRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UnfixableRepository for SqliteUnfixableRepository {
    async fn append(&self, item: &UnfixableItem) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"INSERT INTO unfixable_items (scenario_id, mode, reason, recorded_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(scenario_id, mode) DO NOTHING"#,
        )
        .bind(&item.scenario_id)
        .bind(item.mode.as_str())
        .bind(&item.reason)
        .bind(item.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::PersistenceWriteFailure(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> DomainResult<Vec<UnfixableItem>> {
        let rows: Vec<UnfixableRow> =
            sqlx::query_as("SELECT * FROM unfixable_items ORDER BY recorded_at, scenario_id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn contains(&self, scenario_id: &str, mode: ScenarioMode) -> DomainResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM unfixable_items WHERE scenario_id = ? AND mode = ?")
                .bind(scenario_id)
                .bind(mode.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}

#[derive(sqlx::FromRow)]
struct UnfixableRow {
    scenario_id: String,
    mode: String,
    reason: String,
    recorded_at: String,
}

impl TryFrom<UnfixableRow> for UnfixableItem {
    type Error = DomainError;

    fn try_from(row: UnfixableRow) -> Result<Self, Self::Error> {
        Ok(UnfixableItem {
            scenario_id: row.scenario_id,
            mode: super::parse_mode(&row.mode)?,
            reason: row.reason,
            recorded_at: super::parse_datetime(&row.recorded_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteUnfixableRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteUnfixableRepository::new(pool)
    }

    #[tokio::test]
    async fn test_append_is_idempotent_per_scenario_and_mode() {
        let repo = setup_test_repo().await;

        let first = UnfixableItem::new("export-pdf", ScenarioMode::Scripted, "third-party renderer");
        assert!(repo.append(&first).await.unwrap());
        assert!(!repo
            .append(&UnfixableItem::new("export-pdf", ScenarioMode::Scripted, "again"))
            .await
            .unwrap());
        assert!(repo
            .append(&UnfixableItem::new("export-pdf", ScenarioMode::Exploratory, "other mode"))
            .await
            .unwrap());

        let items = repo.list().await.unwrap();
        assert_eq!(items.len(), 2);
        let scripted = items.iter().find(|i| i.matches("export-pdf", ScenarioMode::Scripted)).unwrap();
        assert_eq!(scripted.reason, "third-party renderer");
    }

    #[tokio::test]
    async fn test_contains() {
        let repo = setup_test_repo().await;
        repo.append(&UnfixableItem::new("s1", ScenarioMode::Exploratory, "flaky vendor widget"))
            .await
            .unwrap();

        assert!(repo.contains("s1", ScenarioMode::Exploratory).await.unwrap());
        assert!(!repo.contains("s1", ScenarioMode::Scripted).await.unwrap());
        assert!(!repo.contains("s2", ScenarioMode::Exploratory).await.unwrap());
    }
}
