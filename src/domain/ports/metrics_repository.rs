use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::MetricsPoint;

/// Repository port for the per-loop metrics history
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Record the point for one iteration; the first point recorded for an iteration is kept
    async fn append(&self, loop_id: &str, point: &MetricsPoint) -> DomainResult<()>;

    /// History of a loop, ordered by iteration
    async fn history(&self, loop_id: &str) -> DomainResult<Vec<MetricsPoint>>;

    /// Loop ids with recorded history, most recent first
    async fn list_loops(&self) -> DomainResult<Vec<String>>;
}
