//! Removal of blacklisted (scenario, mode) failures before synthesis.

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FailureClusters, UnfixableItem};
use crate::domain::ports::UnfixableRepository;

/// Result of filtering one set of clusters.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub clusters: FailureClusters,
    /// Failures dropped because their (scenario, mode) is blacklisted.
    pub removed: usize,
    /// Clusters that became empty and were dropped.
    pub emptied_clusters: Vec<String>,
}

/// Drop every failure matching a blacklist item, then every empty cluster.
pub fn filter_clusters(clusters: FailureClusters, blacklist: &[UnfixableItem]) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for (cluster, failures) in clusters {
        let before = failures.len();
        let kept: Vec<_> = failures
            .into_iter()
            .filter(|f| !blacklist.iter().any(|item| item.matches(&f.scenario_id, f.mode)))
            .collect();
        outcome.removed += before - kept.len();

        if kept.is_empty() {
            outcome.emptied_clusters.push(cluster);
        } else {
            outcome.clusters.insert(cluster, kept);
        }
    }

    outcome
}

/// Applies the persistent blacklist to failure clusters.
pub struct UnfixableFilter {
    unfixable: Arc<dyn UnfixableRepository>,
}

impl UnfixableFilter {
    pub fn new(unfixable: Arc<dyn UnfixableRepository>) -> Self {
        Self { unfixable }
    }

    pub async fn apply(&self, clusters: FailureClusters) -> DomainResult<FilterOutcome> {
        let blacklist = self.unfixable.list().await?;
        let outcome = filter_clusters(clusters, &blacklist);
        if outcome.removed > 0 {
            tracing::info!(
                removed = outcome.removed,
                emptied = ?outcome.emptied_clusters,
                "Filtered blacklisted failures"
            );
        }
        Ok(outcome)
    }
}
