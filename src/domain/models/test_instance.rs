//! Test instance domain model.
//!
//! A test instance is the persisted outcome of one (persona, scenario, mode)
//! pair within one run. It is written once and never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::roster::{ScenarioMode, TestPair};

/// Overall verdict of a test instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pass,
    Fail,
    Partial,
    /// The oracle could not produce a usable result.
    Error,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pass" | "passed" => Some(Self::Pass),
            "fail" | "failed" => Some(Self::Fail),
            "partial" => Some(Self::Partial),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Classify from step counts.
    ///
    /// `completed` counts steps that finished successfully.
    pub fn classify(completed: u32, failed: u32) -> Self {
        if completed == 0 {
            Self::Fail
        } else if failed == 0 {
            Self::Pass
        } else {
            Self::Partial
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an individual step as reported by the test oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[serde(alias = "passed", alias = "ok", alias = "success")]
    Pass,
    #[serde(alias = "failed", alias = "error", alias = "blocked")]
    Fail,
    #[serde(alias = "skip", alias = "not_run")]
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

/// Idempotency key of a test instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub run_id: String,
    pub persona_id: String,
    pub scenario_id: String,
    pub mode: ScenarioMode,
}

impl InstanceKey {
    pub fn new(run_id: impl Into<String>, pair: &TestPair) -> Self {
        Self {
            run_id: run_id.into(),
            persona_id: pair.persona_id.clone(),
            scenario_id: pair.scenario_id.clone(),
            mode: pair.mode,
        }
    }

    pub fn pair(&self) -> TestPair {
        TestPair::new(&self.persona_id, &self.scenario_id, self.mode)
    }
}

/// Run id the control loop uses for one iteration of one loop.
pub fn iteration_run_id(loop_id: &str, iteration: u32) -> String {
    format!("{loop_id}-it{iteration:02}")
}

/// Scripted-mode step detail, also the element type of the oracle's `step_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedStepDetail {
    pub step_number: u32,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Exploratory-mode step detail, the element type of `discovered_steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploratoryStepDetail {
    #[serde(default)]
    pub sequence: u32,
    pub description: String,
    #[serde(alias = "status")]
    pub outcome: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Mode-specific step detail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDetail {
    Scripted(ScriptedStepDetail),
    Exploratory(ExploratoryStepDetail),
}

impl StepDetail {
    pub fn status(&self) -> StepStatus {
        match self {
            Self::Scripted(d) => d.status,
            Self::Exploratory(d) => d.outcome,
        }
    }

    pub fn ordinal(&self) -> u32 {
        match self {
            Self::Scripted(d) => d.step_number,
            Self::Exploratory(d) => d.sequence,
        }
    }
}

/// Persisted outcome of one test pair in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInstance {
    pub id: Uuid,
    pub key: InstanceKey,
    pub status: OverallStatus,
    pub steps_total: u32,
    pub steps_completed: u32,
    pub steps_failed: u32,
    /// Mean rubric score, exploratory mode only.
    pub score: Option<f64>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TestInstance {
    /// Build an instance from oracle step details.
    pub fn from_details(
        key: InstanceKey,
        details: &[StepDetail],
        score: Option<f64>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let steps_total = details.len() as u32;
        let steps_completed = details
            .iter()
            .filter(|d| d.status() == StepStatus::Pass)
            .count() as u32;
        let steps_failed = details.iter().filter(|d| d.status().is_failure()).count() as u32;

        Self {
            id: Uuid::new_v4(),
            key,
            status: OverallStatus::classify(steps_completed, steps_failed),
            steps_total,
            steps_completed,
            steps_failed,
            score,
            error_message: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Build an `error` instance for a pair whose oracle call never produced a result.
    pub fn errored(key: InstanceKey, message: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            status: OverallStatus::Error,
            steps_total: 0,
            steps_completed: 0,
            steps_failed: 0,
            score: None,
            error_message: Some(message.into()),
            started_at,
            finished_at: Utc::now(),
        }
    }
}
