use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Persona, Roster, Scenario};

/// Repository port for personas and scenarios
#[async_trait]
pub trait RosterRepository: Send + Sync {
    /// Insert or replace a scenario
    async fn upsert_scenario(&self, scenario: &Scenario) -> DomainResult<()>;

    /// Insert or replace a persona and its scenario assignments
    async fn upsert_persona(&self, persona: &Persona) -> DomainResult<()>;

    async fn get_persona(&self, id: &str) -> DomainResult<Option<Persona>>;

    async fn get_scenario(&self, id: &str) -> DomainResult<Option<Scenario>>;

    /// All personas, ordered by id
    async fn list_personas(&self) -> DomainResult<Vec<Persona>>;

    /// All scenarios, ordered by id
    async fn list_scenarios(&self) -> DomainResult<Vec<Scenario>>;

    /// Import a validated roster. Scenarios go first so assignments resolve.
    async fn import(&self, roster: &Roster) -> DomainResult<()> {
        roster.validate()?;
        for scenario in &roster.scenarios {
            self.upsert_scenario(scenario).await?;
        }
        for persona in &roster.personas {
            self.upsert_persona(persona).await?;
        }
        Ok(())
    }

    /// Load the whole roster back.
    async fn load(&self) -> DomainResult<Roster> {
        Ok(Roster {
            personas: self.list_personas().await?,
            scenarios: self.list_scenarios().await?,
        })
    }
}
