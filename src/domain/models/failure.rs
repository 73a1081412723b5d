//! Failure clustering and blacklist models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::roster::ScenarioMode;
use super::test_instance::{OverallStatus, StepDetail};

/// One failing test instance, trimmed for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub instance_id: Uuid,
    pub run_id: String,
    pub persona_id: String,
    pub scenario_id: String,
    pub mode: ScenarioMode,
    pub status: OverallStatus,
    pub steps_total: u32,
    pub steps_completed: u32,
    pub steps_failed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub details: Vec<StepDetail>,
}

/// Cluster name → failures, ordered by cluster name.
pub type FailureClusters = BTreeMap<String, Vec<FailureRecord>>;

/// Total number of failures across all clusters.
pub fn failure_count(clusters: &FailureClusters) -> usize {
    clusters.values().map(Vec::len).sum()
}

/// A (scenario, mode) pair flagged as not fixable by the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnfixableItem {
    pub scenario_id: String,
    pub mode: ScenarioMode,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl UnfixableItem {
    pub fn new(scenario_id: impl Into<String>, mode: ScenarioMode, reason: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            mode,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn matches(&self, scenario_id: &str, mode: ScenarioMode) -> bool {
        self.scenario_id == scenario_id && self.mode == mode
    }
}
