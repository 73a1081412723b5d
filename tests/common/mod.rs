//! Common test utilities for integration tests
//!
//! Provides shared fixtures: rosters, in-memory stores and canned oracle
//! replies.

#![allow(dead_code)]

use std::sync::Arc;

use fixloop::adapters::sqlite::{
    create_migrated_test_pool, SqliteMetricsRepository, SqliteResultRepository, SqliteRosterRepository,
    SqliteUnfixableRepository,
};
use fixloop::domain::models::{Credentials, Persona, Roster, Scenario, ScenarioMode, ScenarioStep, TestPair};
use fixloop::domain::ports::{MetricsRepository, ResultRepository, RosterRepository, UnfixableRepository};
use serde_json::{json, Value};

/// Repositories over one in-memory database.
pub struct Stores {
    pub roster: Arc<dyn RosterRepository>,
    pub results: Arc<dyn ResultRepository>,
    pub unfixable: Arc<dyn UnfixableRepository>,
    pub metrics: Arc<dyn MetricsRepository>,
}

pub async fn stores() -> Stores {
    let pool = create_migrated_test_pool().await.expect("Failed to create test pool");
    Stores {
        roster: Arc::new(SqliteRosterRepository::new(pool.clone())),
        results: Arc::new(SqliteResultRepository::new(pool.clone())),
        unfixable: Arc::new(SqliteUnfixableRepository::new(pool.clone())),
        metrics: Arc::new(SqliteMetricsRepository::new(pool)),
    }
}

/// Stores with `roster` already imported.
pub async fn stores_with(roster: &Roster) -> Stores {
    let stores = stores().await;
    stores.roster.import(roster).await.expect("Failed to import roster");
    stores
}

pub fn scripted(id: &str, steps: u32) -> Scenario {
    Scenario {
        id: id.to_string(),
        title: None,
        mode: ScenarioMode::Scripted,
        steps: (1..=steps)
            .map(|n| ScenarioStep {
                number: n,
                action: format!("{id} step {n}"),
                expected: None,
            })
            .collect(),
        goal: None,
    }
}

pub fn exploratory(id: &str, goal: &str) -> Scenario {
    Scenario {
        id: id.to_string(),
        title: None,
        mode: ScenarioMode::Exploratory,
        steps: Vec::new(),
        goal: Some(goal.to_string()),
    }
}

pub fn persona(id: &str, scenarios: &[&Scenario]) -> Persona {
    Persona {
        id: id.to_string(),
        display_name: None,
        credentials: Credentials {
            username: format!("{id}@example.test"),
            password: format!("pw-{id}"),
        },
        scenario_ids: scenarios.iter().map(|s| s.id.clone()).collect(),
    }
}

/// `personas` personas, each assigned every scenario.
pub fn roster(personas: usize, scenarios: Vec<Scenario>) -> Roster {
    let refs: Vec<&Scenario> = scenarios.iter().collect();
    let personas = (0..personas).map(|i| persona(&format!("persona-{i:02}"), &refs)).collect();
    Roster { personas, scenarios }
}

pub fn pairs(roster: &Roster) -> Vec<TestPair> {
    let modes: std::collections::HashMap<&str, ScenarioMode> =
        roster.scenarios.iter().map(|s| (s.id.as_str(), s.mode)).collect();
    roster
        .personas
        .iter()
        .flat_map(|p| {
            p.scenario_ids
                .iter()
                .map(|s| TestPair::new(&p.id, s, modes[s.as_str()]))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Test oracle answer for a scripted request: every step passes, or the
/// last one fails.
pub fn scripted_reply(request: &Value, pass: bool) -> String {
    let steps = request["steps"].as_array().map_or(1, Vec::len).max(1);
    let results: Vec<Value> = (1..=steps)
        .map(|n| {
            if !pass && n == steps {
                json!({"step_number": n, "status": "fail", "failure_reason": "expected element missing"})
            } else {
                json!({"step_number": n, "status": "pass"})
            }
        })
        .collect();
    json!({ "step_results": results }).to_string()
}

pub fn scenario_of(request: &Value) -> &str {
    request["scenario_id"].as_str().unwrap_or_default()
}
