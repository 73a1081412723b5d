//! Fix stage: one fix oracle task per cluster, all in parallel.
//!
//! Tasks share nothing. Each one sees its own fix spec, the files its cluster
//! owns and the list of shared files it must not touch. The stage waits for
//! every task, then checks the ownership contract.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FixOracleRequest, FixOracleResponse, FixResult, FixSpec, OracleKind};
use crate::domain::ports::Oracle;
use crate::services::oracle_calls::call_typed;
use crate::services::shared_files::{OwnershipMap, SharedSnapshot};

/// An applied fix naming a file outside its cluster's owned set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipViolation {
    pub cluster: String,
    pub file: String,
    pub shared: bool,
}

/// Everything the fix stage produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixStageReport {
    /// One result per fix spec, ordered by cluster.
    pub results: Vec<FixResult>,
    pub violations: Vec<OwnershipViolation>,
    /// Shared files a task wrote directly; restored from the snapshot.
    pub restored_shared_files: Vec<String>,
}

impl FixStageReport {
    pub fn failed_tasks(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

pub struct FixStage {
    oracle: Arc<dyn Oracle>,
    ownership: Arc<OwnershipMap>,
    task_timeout: Duration,
}

impl FixStage {
    pub fn new(oracle: Arc<dyn Oracle>, ownership: Arc<OwnershipMap>, task_timeout: Duration) -> Self {
        Self {
            oracle,
            ownership,
            task_timeout,
        }
    }

    /// Run one task per spec and wait for all of them.
    pub async fn run(&self, specs: Vec<FixSpec>) -> DomainResult<FixStageReport> {
        let snapshot = SharedSnapshot::capture(&self.ownership)?;
        let shared_files = self.ownership.shared_files();

        let tasks = specs.into_iter().map(|spec| {
            let cluster = spec.cluster.clone();
            let request = FixOracleRequest {
                owned_files: self.ownership.owned_files(&spec.cluster),
                shared_files: shared_files.clone(),
                fix_spec: spec,
            };
            let oracle = self.oracle.clone();
            let limit = self.task_timeout;
            let span = tracing::info_span!("fix_task", cluster = %cluster);

            let handle = tokio::spawn(
                async move {
                    let call = call_typed::<_, FixOracleResponse>(oracle.as_ref(), OracleKind::Fix, &request, 1);
                    match tokio::time::timeout(limit, call).await {
                        Ok(Ok(response)) => response.into_result(&request.fix_spec.cluster),
                        Ok(Err(e)) => FixResult::missing(&request.fix_spec.cluster, e.to_string()),
                        Err(_) => FixResult::missing(
                            &request.fix_spec.cluster,
                            format!("timed out after {}s", limit.as_secs()),
                        ),
                    }
                }
                .instrument(span),
            );
            async move {
                handle
                    .await
                    .unwrap_or_else(|e| FixResult::missing(&cluster, format!("task aborted: {e}")))
            }
        });

        let mut results = join_all(tasks).await;
        results.sort_by(|a, b| a.cluster.cmp(&b.cluster));

        for result in results.iter().filter(|r| r.error.is_some()) {
            tracing::warn!(cluster = %result.cluster, error = ?result.error, "Fix task produced no result");
        }

        let violations = self.violations(&results);
        let restored_shared_files = snapshot.restore_changed()?;

        tracing::info!(
            tasks = results.len(),
            applied = results.iter().map(|r| r.fixes_applied.len()).sum::<usize>(),
            violations = violations.len(),
            restored = restored_shared_files.len(),
            "Fix stage complete"
        );

        Ok(FixStageReport {
            results,
            violations,
            restored_shared_files,
        })
    }

    fn violations(&self, results: &[FixResult]) -> Vec<OwnershipViolation> {
        results
            .iter()
            .flat_map(|result| {
                result
                    .fixes_applied
                    .iter()
                    .filter_map(|fix| fix.file.as_deref())
                    .filter(|file| !self.ownership.is_owned_by(&result.cluster, file))
                    .map(|file| OwnershipViolation {
                        cluster: result.cluster.clone(),
                        file: file.to_string(),
                        shared: self.ownership.is_shared(file),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oracles::{MockOracle, MockReply};
    use crate::domain::errors::DomainError;
    use crate::domain::models::OwnershipConfig;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn ownership(root: &std::path::Path) -> Arc<OwnershipMap> {
        let mut clusters = BTreeMap::new();
        clusters.insert("invoices".to_string(), vec!["src/invoices.rs".to_string()]);
        clusters.insert("reports".to_string(), vec!["src/reports.rs".to_string()]);
        Arc::new(OwnershipMap::from_config(&OwnershipConfig {
            root: root.to_string_lossy().into_owned(),
            clusters,
            shared: vec!["src/routes.rs".to_string()],
        }))
    }

    fn spec(cluster: &str) -> FixSpec {
        serde_json::from_value(json!({"cluster": cluster, "diagnosis": "d"})).unwrap()
    }

    #[tokio::test]
    async fn test_every_task_contributes_a_result() {
        let dir = TempDir::new().unwrap();
        let oracle = MockOracle::new("fix-oracle").with_handler(OracleKind::Fix, |req| {
            match req["fix_spec"]["cluster"].as_str() {
                Some("invoices") => Ok(json!({
                    "cluster": "invoices",
                    "fixes_applied": [
                        {"file": "src/invoices.rs", "description": "add handler"},
                        {"file": "src/routes.rs", "description": "sneaky"}
                    ],
                    "shared_file_changes_needed": [
                        {"change_type": "add_route", "file": "src/routes.rs", "content": "route(\"/inv\")", "anchor": "// routes"}
                    ],
                    "fixes_skipped": []
                })
                .to_string()),
                _ => Err(DomainError::OracleTimeoutOrCrash {
                    oracle: "fix-oracle".to_string(),
                    reason: "exit 1".to_string(),
                }),
            }
        });

        let stage = FixStage::new(Arc::new(oracle.clone()), ownership(dir.path()), Duration::from_secs(5));
        let report = stage.run(vec![spec("reports"), spec("invoices")]).await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].cluster, "invoices");
        assert_eq!(report.results[0].shared_file_changes_needed.len(), 1);
        assert!(report.results[1].error.is_some());
        assert_eq!(report.failed_tasks(), 1);

        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].shared);

        let requests = oracle.requests(OracleKind::Fix);
        let invoices = requests
            .iter()
            .find(|r| r["fix_spec"]["cluster"] == "invoices")
            .unwrap();
        assert_eq!(invoices["owned_files"], json!(["src/invoices.rs"]));
        assert_eq!(invoices["shared_files"], json!(["src/routes.rs"]));
    }

    #[tokio::test]
    async fn test_malformed_output_is_an_empty_result() {
        let dir = TempDir::new().unwrap();
        let oracle = MockOracle::new("fix-oracle");
        oracle.push_reply(OracleKind::Fix, MockReply::Text("I fixed it!".to_string()));
        oracle.push_reply(OracleKind::Fix, MockReply::json(json!({"status": "I could not do it"})));

        let stage = FixStage::new(Arc::new(oracle), ownership(dir.path()), Duration::from_secs(5));
        for _ in 0..2 {
            let report = stage.run(vec![spec("invoices")]).await.unwrap();
            assert_eq!(report.results[0].cluster, "invoices");
            assert!(report.results[0].fixes_applied.is_empty());
            assert!(report.results[0].error.is_some());
            assert_eq!(report.failed_tasks(), 1);
        }
    }
}
