use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ScenarioMode, UnfixableItem};

/// Repository port for the unfixable blacklist
///
/// Append-only. Nothing in the loop ever removes an entry.
#[async_trait]
pub trait UnfixableRepository: Send + Sync {
    /// Append an item. Returns `false` if the (scenario, mode) is already listed.
    async fn append(&self, item: &UnfixableItem) -> DomainResult<bool>;

    async fn list(&self) -> DomainResult<Vec<UnfixableItem>>;

    async fn contains(&self, scenario_id: &str, mode: ScenarioMode) -> DomainResult<bool>;
}
