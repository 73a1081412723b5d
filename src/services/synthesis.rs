//! Synthesis stage: one diagnosis oracle call per iteration.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DiagnosisRequest, DiagnosisResponse, FailureClusters, FixSpec, OracleKind};
use crate::domain::ports::Oracle;
use crate::services::oracle_calls::call_typed;

/// Fix specs sorted by what the loop does with them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisPlan {
    /// Sent to the fix stage.
    pub fixable: Vec<FixSpec>,
    /// Their failures go on the blacklist.
    pub unfixable: Vec<FixSpec>,
    /// Listed for a human; not sent to the fix stage.
    pub needs_human: Vec<FixSpec>,
    /// Specs naming a cluster that had no failures; ignored.
    pub unknown_clusters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl SynthesisPlan {
    /// Sort the specs of `response` against the clusters that were diagnosed.
    ///
    /// Only the first spec per cluster is kept. `unfixable` takes precedence
    /// over `needs_interrogation`.
    pub fn from_response(response: DiagnosisResponse, clusters: &FailureClusters) -> Self {
        let mut plan = Self {
            summary: response.summary,
            ..Self::default()
        };
        let mut seen = HashSet::new();

        for spec in response.fix_specs {
            if !clusters.contains_key(&spec.cluster) {
                plan.unknown_clusters.push(spec.cluster);
                continue;
            }
            if !seen.insert(spec.cluster.clone()) {
                continue;
            }
            if spec.unfixable {
                plan.unfixable.push(spec);
            } else if spec.needs_human {
                plan.needs_human.push(spec);
            } else {
                plan.fixable.push(spec);
            }
        }
        plan
    }
}

pub struct SynthesisStage {
    oracle: Arc<dyn Oracle>,
}

impl SynthesisStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Ask the diagnosis oracle for fix specs.
    ///
    /// A response without a parseable object carrying `fix_specs` fails the
    /// stage; the caller decides whether to retry.
    #[instrument(skip(self, clusters), fields(clusters = clusters.len()))]
    pub async fn synthesize(
        &self,
        run_id: &str,
        iteration: u32,
        clusters: &FailureClusters,
    ) -> DomainResult<DiagnosisResponse> {
        let request = DiagnosisRequest {
            run_id: run_id.to_string(),
            iteration,
            clusters: clusters.clone(),
        };

        let response: DiagnosisResponse = call_typed(self.oracle.as_ref(), OracleKind::Diagnosis, &request, 1)
            .await
            .map_err(|e| DomainError::SynthesisFailed(e.to_string()))?;

        tracing::info!(specs = response.fix_specs.len(), "Diagnosis complete");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oracles::{MockOracle, MockReply};
    use serde_json::json;

    fn clusters(names: &[&str]) -> FailureClusters {
        names.iter().map(|n| (n.to_string(), vec![])).collect()
    }

    #[tokio::test]
    async fn test_response_wrapped_in_prose_is_accepted() {
        let oracle = MockOracle::new("diagnosis-oracle");
        oracle.push_reply(
            OracleKind::Diagnosis,
            MockReply::Text(format!(
                "Analysis follows.\n{}\nThanks.",
                json!({"fix_specs": [{"cluster": "invoices", "diagnosis": "route missing"}], "summary": "one"})
            )),
        );

        let stage = SynthesisStage::new(Arc::new(oracle));
        let response = stage.synthesize("run", 1, &clusters(&["invoices"])).await.unwrap();
        assert_eq!(response.fix_specs.len(), 1);
        assert_eq!(response.summary.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_keyless_response_is_a_hard_failure() {
        let oracle = MockOracle::new("diagnosis-oracle");
        oracle.push_reply(OracleKind::Diagnosis, MockReply::json(json!({"specs": []})));

        let stage = SynthesisStage::new(Arc::new(oracle.clone()));
        let result = stage.synthesize("run", 1, &clusters(&["invoices"])).await;
        assert!(matches!(result, Err(DomainError::SynthesisFailed(_))));
        assert_eq!(oracle.calls(OracleKind::Diagnosis), 1);
    }

    #[test]
    fn test_plan_sorts_specs() {
        let response: DiagnosisResponse = serde_json::from_value(json!({
            "fix_specs": [
                {"cluster": "invoices", "diagnosis": "fixable"},
                {"cluster": "reports", "unfixable": true, "needs_interrogation": true},
                {"cluster": "auth", "needs_interrogation": true},
                {"cluster": "ghost"},
                {"cluster": "invoices", "diagnosis": "duplicate"}
            ]
        }))
        .unwrap();

        let plan = SynthesisPlan::from_response(response, &clusters(&["invoices", "reports", "auth"]));
        assert_eq!(plan.fixable.len(), 1);
        assert_eq!(plan.fixable[0].diagnosis, "fixable");
        assert_eq!(plan.unfixable[0].cluster, "reports");
        assert_eq!(plan.needs_human[0].cluster, "auth");
        assert_eq!(plan.unknown_clusters, vec!["ghost"]);
    }
}
