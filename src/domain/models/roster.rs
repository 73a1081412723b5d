//! Persona and scenario domain models.
//!
//! A roster is the immutable test input for a run: synthetic users
//! (personas) and the journeys (scenarios) each of them walks through.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::domain::errors::{DomainError, DomainResult};

/// How a scenario is driven by the test oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    /// Follows explicit, numbered steps.
    Scripted,
    /// Pursues a goal without predefined steps.
    Exploratory,
}

impl Default for ScenarioMode {
    fn default() -> Self {
        Self::Scripted
    }
}

impl ScenarioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scripted => "scripted",
            Self::Exploratory => "exploratory",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scripted" => Some(Self::Scripted),
            "exploratory" => Some(Self::Exploratory),
            _ => None,
        }
    }
}

impl fmt::Display for ScenarioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login credentials for a persona.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A synthetic test user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub credentials: Credentials,
    /// Scenario ids assigned to this persona, in execution order.
    #[serde(default, alias = "scenarios")]
    pub scenario_ids: Vec<String>,
}

/// One step of a scripted scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub number: u32,
    pub action: String,
    #[serde(default)]
    pub expected: Option<String>,
}

/// A user journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub mode: ScenarioMode,
    /// Steps for scripted mode.
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
    /// Goal text for exploratory mode.
    #[serde(default)]
    pub goal: Option<String>,
}

impl Scenario {
    /// Number of predefined steps, `None` for exploratory scenarios.
    pub fn step_count(&self) -> Option<usize> {
        match self.mode {
            ScenarioMode::Scripted => Some(self.steps.len()),
            ScenarioMode::Exploratory => None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::ValidationFailed("scenario id cannot be empty".to_string()));
        }
        match self.mode {
            ScenarioMode::Scripted if self.steps.is_empty() => Err(DomainError::ValidationFailed(
                format!("scripted scenario '{}' has no steps", self.id),
            )),
            ScenarioMode::Exploratory if self.goal.as_deref().map_or(true, |g| g.trim().is_empty()) => {
                Err(DomainError::ValidationFailed(format!(
                    "exploratory scenario '{}' has no goal",
                    self.id
                )))
            }
            _ => Ok(()),
        }
    }
}

/// One unit of work for a test worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestPair {
    pub persona_id: String,
    pub scenario_id: String,
    pub mode: ScenarioMode,
}

impl TestPair {
    pub fn new(persona_id: impl Into<String>, scenario_id: impl Into<String>, mode: ScenarioMode) -> Self {
        Self {
            persona_id: persona_id.into(),
            scenario_id: scenario_id.into(),
            mode,
        }
    }
}

impl fmt::Display for TestPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.persona_id, self.scenario_id, self.mode)
    }
}

/// The full test input: personas plus the scenarios they reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub personas: Vec<Persona>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl Roster {
    /// Load a roster from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> DomainResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let roster: Roster = serde_yaml::from_str(&raw)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        roster.validate()?;
        Ok(roster)
    }

    /// Reject duplicate ids and dangling scenario references.
    pub fn validate(&self) -> DomainResult<()> {
        let mut scenario_ids = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !scenario_ids.insert(scenario.id.as_str()) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate scenario id '{}'",
                    scenario.id
                )));
            }
        }

        let mut persona_ids = HashSet::new();
        for persona in &self.personas {
            if !persona_ids.insert(persona.id.as_str()) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate persona id '{}'",
                    persona.id
                )));
            }
            if let Some(missing) = persona
                .scenario_ids
                .iter()
                .find(|id| !scenario_ids.contains(id.as_str()))
            {
                return Err(DomainError::ScenarioNotFound(format!(
                    "{missing} (assigned to persona '{}')",
                    persona.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(id: &str) -> Scenario {
        Scenario {
            id: id.to_string(),
            title: None,
            mode: ScenarioMode::Scripted,
            steps: vec![ScenarioStep {
                number: 1,
                action: "open dashboard".to_string(),
                expected: None,
            }],
            goal: None,
        }
    }

    #[test]
    fn test_mode_round_trip_strings() {
        assert_eq!(ScenarioMode::from_str("Exploratory"), Some(ScenarioMode::Exploratory));
        assert_eq!(ScenarioMode::Scripted.as_str(), "scripted");
        assert_eq!(ScenarioMode::from_str("manual"), None);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            username: "ana".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("ana"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_roster_rejects_dangling_scenario() {
        let roster = Roster {
            personas: vec![Persona {
                id: "p1".to_string(),
                display_name: None,
                credentials: Credentials::default(),
                scenario_ids: vec!["missing".to_string()],
            }],
            scenarios: vec![scripted("s1")],
        };
        assert!(matches!(roster.validate(), Err(DomainError::ScenarioNotFound(_))));
    }

    #[test]
    fn test_exploratory_requires_goal() {
        let scenario = Scenario {
            id: "explore".to_string(),
            title: None,
            mode: ScenarioMode::Exploratory,
            steps: vec![],
            goal: Some("   ".to_string()),
        };
        assert!(scenario.validate().is_err());
        assert_eq!(scenario.step_count(), None);
    }

    #[test]
    fn test_roster_yaml_parsing() {
        let yaml = r"
personas:
  - id: owner
    credentials: { username: owner@example.com, password: pw }
    scenarios: [create-invoice]
scenarios:
  - id: create-invoice
    mode: scripted
    steps:
      - { number: 1, action: open invoices }
      - { number: 2, action: click new, expected: form opens }
";
        let roster: Roster = serde_yaml::from_str(yaml).expect("roster should parse");
        roster.validate().expect("roster should be valid");
        assert_eq!(roster.personas[0].scenario_ids, vec!["create-invoice"]);
        assert_eq!(roster.scenarios[0].step_count(), Some(2));
    }
}
