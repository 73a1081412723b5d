//! Expansion of a roster into the persona × scenario test matrix.

use std::collections::HashMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Roster, Scenario, TestPair};

/// Every (persona, assigned scenario, mode) pair, personas in roster order and
/// scenarios in assignment order.
pub fn build_matrix(roster: &Roster) -> DomainResult<Vec<TestPair>> {
    let scenarios: HashMap<&str, &Scenario> =
        roster.scenarios.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut pairs = Vec::new();
    for persona in &roster.personas {
        for scenario_id in &persona.scenario_ids {
            let scenario = scenarios
                .get(scenario_id.as_str())
                .ok_or_else(|| DomainError::ScenarioNotFound(scenario_id.clone()))?;
            pairs.push(TestPair::new(&persona.id, &scenario.id, scenario.mode));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Credentials, Persona, ScenarioMode};

    fn persona(id: &str, scenarios: &[&str]) -> Persona {
        Persona {
            id: id.to_string(),
            display_name: None,
            credentials: Credentials {
                username: id.to_string(),
                password: "pw".to_string(),
            },
            scenario_ids: scenarios.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn scenario(id: &str, mode: ScenarioMode) -> Scenario {
        Scenario {
            id: id.to_string(),
            title: None,
            mode,
            steps: vec![],
            goal: Some("goal".to_string()),
        }
    }

    #[test]
    fn test_matrix_follows_roster_order() {
        let roster = Roster {
            personas: vec![persona("b", &["s2", "s1"]), persona("a", &["s1"])],
            scenarios: vec![
                scenario("s1", ScenarioMode::Exploratory),
                scenario("s2", ScenarioMode::Exploratory),
            ],
        };

        let pairs = build_matrix(&roster).unwrap();
        let rendered: Vec<String> = pairs.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["b/s2/exploratory", "b/s1/exploratory", "a/s1/exploratory"]
        );
    }

    #[test]
    fn test_dangling_scenario_is_an_error() {
        let roster = Roster {
            personas: vec![persona("a", &["missing"])],
            scenarios: vec![],
        };
        assert!(matches!(
            build_matrix(&roster),
            Err(DomainError::ScenarioNotFound(id)) if id == "missing"
        ));
    }
}
