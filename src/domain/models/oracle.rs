//! Request and response schemas of the four oracles.
//!
//! Every oracle is free-form on the inside; these types are the strict
//! contract at its edge. A response that does not deserialize into the
//! expected type is malformed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::failure::FailureClusters;
use super::fix::{AppliedFix, ChangeDescriptor, FixResult, FixSpec, SkippedFix, TaggedChange};
use super::roster::{Credentials, ScenarioMode, ScenarioStep};
use super::test_instance::{ExploratoryStepDetail, ScriptedStepDetail};

/// Which oracle a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    Test,
    Diagnosis,
    Fix,
    Merge,
}

impl OracleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Diagnosis => "diagnosis",
            Self::Fix => "fix",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request sent to the test oracle for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOracleRequest {
    pub target: String,
    pub persona_id: String,
    pub credentials: Credentials,
    pub scenario_id: String,
    pub mode: ScenarioMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<ScenarioStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub artifact_dir: String,
    /// Upper bound on browser-level actions for this attempt.
    pub action_budget: u32,
}

/// Scripted-mode test oracle response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedResponse {
    pub step_results: Vec<ScriptedStepDetail>,
}

/// Exploratory-mode test oracle response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploratoryResponse {
    pub discovered_steps: Vec<ExploratoryStepDetail>,
    #[serde(default)]
    pub rubric_scores: BTreeMap<String, f64>,
}

impl ExploratoryResponse {
    /// Mean rubric score, `None` when no rubric was returned.
    pub fn mean_score(&self) -> Option<f64> {
        if self.rubric_scores.is_empty() {
            return None;
        }
        Some(self.rubric_scores.values().sum::<f64>() / self.rubric_scores.len() as f64)
    }
}

/// Request sent to the diagnosis oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisRequest {
    pub run_id: String,
    pub iteration: u32,
    pub clusters: FailureClusters,
}

/// Diagnosis oracle response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResponse {
    pub fix_specs: Vec<FixSpec>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Request sent to one fix oracle instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOracleRequest {
    pub fix_spec: FixSpec,
    pub owned_files: Vec<String>,
    pub shared_files: Vec<String>,
}

/// Fix oracle response. The three lists are required, even when empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOracleResponse {
    #[serde(default)]
    pub cluster: Option<String>,
    pub fixes_applied: Vec<AppliedFix>,
    pub shared_file_changes_needed: Vec<ChangeDescriptor>,
    pub fixes_skipped: Vec<SkippedFix>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FixOracleResponse {
    /// The fix result for `cluster`; the cluster the oracle echoes is ignored.
    pub fn into_result(self, cluster: impl Into<String>) -> FixResult {
        FixResult {
            cluster: cluster.into(),
            fixes_applied: self.fixes_applied,
            shared_file_changes_needed: self.shared_file_changes_needed,
            fixes_skipped: self.fixes_skipped,
            notes: self.notes,
            error: None,
        }
    }
}

/// Request sent to the merge oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOracleRequest {
    pub changes: Vec<TaggedChange>,
    pub shared_files: Vec<String>,
}

/// Merge oracle response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeOracleResponse {
    pub merged: Vec<serde_json::Value>,
    #[serde(default)]
    pub conflicts: Vec<serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_score() {
        let mut response = ExploratoryResponse {
            discovered_steps: vec![],
            rubric_scores: BTreeMap::new(),
        };
        assert_eq!(response.mean_score(), None);

        response.rubric_scores.insert("clarity".to_string(), 40.0);
        response.rubric_scores.insert("speed".to_string(), 60.0);
        assert_eq!(response.mean_score(), Some(50.0));
    }

    #[test]
    fn test_fix_response_requires_the_three_lists() {
        let loose = serde_json::from_str::<FixOracleResponse>(r#"{"status": "I could not do it"}"#);
        assert!(loose.is_err());

        let strict: FixOracleResponse = serde_json::from_str(
            r#"{"fixes_applied": [], "shared_file_changes_needed": [], "fixes_skipped": [], "notes": "nothing"}"#,
        )
        .unwrap();
        let result = strict.into_result("invoices");
        assert_eq!(result.cluster, "invoices");
        assert_eq!(result.notes.as_deref(), Some("nothing"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_scripted_response_requires_step_results() {
        let parsed = serde_json::from_str::<ScriptedResponse>(r#"{"steps": []}"#);
        assert!(parsed.is_err());
    }
}
