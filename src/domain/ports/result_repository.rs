use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{InstanceKey, OverallStatus, StepDetail, TestInstance};

/// Number of instances with a given status in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCount {
    pub status: OverallStatus,
    pub count: u64,
}

/// Repository port for test results
///
/// Instances are write-once: a second insert for the same
/// (run, persona, scenario, mode) is ignored and reported as such.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Look up the instance for an idempotency key
    async fn get_instance(&self, key: &InstanceKey) -> DomainResult<Option<TestInstance>>;

    /// Insert an instance and its step details atomically.
    ///
    /// Returns `false` when an instance for the same key already exists;
    /// nothing is written in that case.
    async fn insert_instance(
        &self,
        instance: &TestInstance,
        details: &[StepDetail],
    ) -> DomainResult<bool>;

    /// All instances of a run, ordered by persona, scenario and mode
    async fn list_by_run(&self, run_id: &str) -> DomainResult<Vec<TestInstance>>;

    /// Instances of a run whose status is not `pass`
    async fn list_failures(&self, run_id: &str) -> DomainResult<Vec<TestInstance>>;

    /// Step details of an instance, in step order
    async fn get_details(&self, instance_id: uuid::Uuid) -> DomainResult<Vec<StepDetail>>;

    /// Per-status counts for a run
    async fn count_by_status(&self, run_id: &str) -> DomainResult<Vec<StatusCount>>;

    /// Distinct run ids, most recent first
    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<String>>;
}
