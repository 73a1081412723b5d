//! SQLite implementation of the RosterRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Credentials, Persona, Scenario, ScenarioStep};
use crate::domain::ports::RosterRepository;

#[derive(Clone)]
pub struct SqliteRosterRepository {
    pool: SqlitePool,
}

impl SqliteRosterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn assigned_scenarios(&self, persona_id: &str) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT scenario_id FROM persona_scenarios WHERE persona_id = ? ORDER BY position",
        )
        .bind(persona_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl RosterRepository for SqliteRosterRepository {
    async fn upsert_scenario(&self, scenario: &Scenario) -> DomainResult<()> {
        let steps_json = serde_json::to_string(&scenario.steps)?;

        sqlx::query(
            r#"INSERT INTO scenarios (id, title, mode, steps, goal, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title, mode = excluded.mode, steps = excluded.steps,
                 goal = excluded.goal, updated_at = excluded.updated_at"#,
        )
        .bind(&scenario.id)
        .bind(&scenario.title)
        .bind(scenario.mode.as_str())
        .bind(&steps_json)
        .bind(&scenario.goal)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_persona(&self, persona: &Persona) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO personas (id, display_name, username, password, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name, username = excluded.username,
                 password = excluded.password, updated_at = excluded.updated_at"#,
        )
        .bind(&persona.id)
        .bind(&persona.display_name)
        .bind(&persona.credentials.username)
        .bind(&persona.credentials.password)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM persona_scenarios WHERE persona_id = ?")
            .bind(&persona.id)
            .execute(&mut *tx)
            .await?;

        for (position, scenario_id) in persona.scenario_ids.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO persona_scenarios (persona_id, scenario_id, position) VALUES (?, ?, ?)",
            )
            .bind(&persona.id)
            .bind(scenario_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.message().contains("FOREIGN KEY") => {
                    DomainError::ScenarioNotFound(scenario_id.clone())
                }
                other => other.into(),
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_persona(&self, id: &str) -> DomainResult<Option<Persona>> {
        let row: Option<PersonaRow> = sqlx::query_as("SELECT * FROM personas WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let scenario_ids = self.assigned_scenarios(&row.id).await?;
                Ok(Some(row.into_persona(scenario_ids)))
            }
            None => Ok(None),
        }
    }

    async fn get_scenario(&self, id: &str) -> DomainResult<Option<Scenario>> {
        let row: Option<ScenarioRow> = sqlx::query_as("SELECT * FROM scenarios WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn list_personas(&self) -> DomainResult<Vec<Persona>> {
        let rows: Vec<PersonaRow> = sqlx::query_as("SELECT * FROM personas ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut personas = Vec::with_capacity(rows.len());
        for row in rows {
            let scenario_ids = self.assigned_scenarios(&row.id).await?;
            personas.push(row.into_persona(scenario_ids));
        }
        Ok(personas)
    }

    async fn list_scenarios(&self) -> DomainResult<Vec<Scenario>> {
        let rows: Vec<ScenarioRow> = sqlx::query_as("SELECT * FROM scenarios ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

#[derive(sqlx::FromRow)]
struct PersonaRow {
    id: String,
    display_name: Option<String>,
    username: String,
    password: String,
}

impl PersonaRow {
    fn into_persona(self, scenario_ids: Vec<String>) -> Persona {
        Persona {
            id: self.id,
            display_name: self.display_name,
            credentials: Credentials {
                username: self.username,
                password: self.password,
            },
            scenario_ids,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScenarioRow {
    id: String,
    title: Option<String>,
    mode: String,
    steps: String,
    goal: Option<String>,
}

impl TryFrom<ScenarioRow> for Scenario {
    type Error = DomainError;

    fn try_from(row: ScenarioRow) -> Result<Self, Self::Error> {
        let mode = super::parse_mode(&row.mode)?;
        let steps: Vec<ScenarioStep> = serde_json::from_str(&row.steps)?;

        Ok(Scenario {
            id: row.id,
            title: row.title,
            mode,
            steps,
            goal: row.goal,
        })
    }
}
