//! Scenario to cluster lookup.

use std::collections::{BTreeMap, HashMap};

/// Cluster name used for scenarios that no cluster claims.
pub const UNKNOWN_CLUSTER: &str = "unknown";

/// Static, total mapping from scenario id to feature-area cluster.
///
/// Built from configuration (`clusters: {name: [scenario ids]}`). Lookups
/// never fail; unmapped scenarios land in [`UNKNOWN_CLUSTER`].
#[derive(Debug, Clone, Default)]
pub struct ClusterMap {
    by_scenario: HashMap<String, String>,
}

impl ClusterMap {
    /// Build the lookup from a cluster → scenarios table.
    ///
    /// When a scenario is listed under several clusters the alphabetically
    /// first cluster wins, so the result does not depend on map iteration.
    pub fn from_clusters(clusters: &BTreeMap<String, Vec<String>>) -> Self {
        let mut by_scenario = HashMap::new();
        for (cluster, scenarios) in clusters {
            for scenario in scenarios {
                by_scenario
                    .entry(scenario.clone())
                    .or_insert_with(|| cluster.clone());
            }
        }
        Self { by_scenario }
    }

    pub fn cluster_for(&self, scenario_id: &str) -> &str {
        self.by_scenario
            .get(scenario_id)
            .map_or(UNKNOWN_CLUSTER, String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_scenario.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_scenario.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_scenario_falls_back_to_unknown() {
        let map = ClusterMap::default();
        assert_eq!(map.cluster_for("anything"), UNKNOWN_CLUSTER);
        assert_eq!(map.cluster_for(""), UNKNOWN_CLUSTER);
    }

    #[test]
    fn test_duplicate_listing_is_deterministic() {
        let mut clusters = BTreeMap::new();
        clusters.insert("payments".to_string(), vec!["checkout".to_string()]);
        clusters.insert("invoices".to_string(), vec!["checkout".to_string(), "send".to_string()]);

        let map = ClusterMap::from_clusters(&clusters);
        assert_eq!(map.cluster_for("checkout"), "invoices");
        assert_eq!(map.cluster_for("send"), "invoices");
        assert_eq!(map.len(), 2);
    }
}
