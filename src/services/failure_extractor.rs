//! Selection, clustering and trimming of the failures of one run.

use std::sync::Arc;

use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ClusterMap, FailureClusters, FailureRecord, StepDetail, TestInstance};
use crate::domain::ports::ResultRepository;
use crate::services::context_truncation::PayloadTrimmer;

pub struct FailureExtractor {
    results: Arc<dyn ResultRepository>,
    clusters: ClusterMap,
    trimmer: PayloadTrimmer,
}

impl FailureExtractor {
    pub fn new(results: Arc<dyn ResultRepository>, clusters: ClusterMap, trimmer: PayloadTrimmer) -> Self {
        Self {
            results,
            clusters,
            trimmer,
        }
    }

    /// Every non-pass instance of `run_id`, grouped by cluster with trimmed detail.
    #[instrument(skip(self))]
    pub async fn extract(&self, run_id: &str) -> DomainResult<FailureClusters> {
        let failures = self.results.list_failures(run_id).await?;
        let mut clusters = FailureClusters::new();

        for instance in failures {
            let details = self.results.get_details(instance.id).await?;
            let cluster = self.clusters.cluster_for(&instance.key.scenario_id).to_string();
            let record = self.record(instance, details);
            clusters.entry(cluster).or_default().push(record);
        }

        tracing::info!(
            clusters = clusters.len(),
            failures = clusters.values().map(Vec::len).sum::<usize>(),
            "Extracted failures"
        );
        Ok(clusters)
    }

    fn record(&self, instance: TestInstance, details: Vec<StepDetail>) -> FailureRecord {
        FailureRecord {
            instance_id: instance.id,
            run_id: instance.key.run_id,
            persona_id: instance.key.persona_id,
            scenario_id: instance.key.scenario_id,
            mode: instance.key.mode,
            status: instance.status,
            steps_total: instance.steps_total,
            steps_completed: instance.steps_completed,
            steps_failed: instance.steps_failed,
            score: instance.score,
            error_message: instance.error_message.map(|m| self.trimmer.text(&m)),
            details: self.trimmer.details(details),
        }
    }
}
