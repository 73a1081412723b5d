//! Oracle port - interface for external judgment.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::OracleKind;

/// An external, non-deterministic judge.
///
/// The oracle receives a structured JSON request and returns raw text. The
/// text is expected to contain one JSON object; extracting and validating it
/// is the caller's job, so adapters never interpret the payload.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Send one request and return the raw response text.
    ///
    /// Fails with `OracleTimeoutOrCrash` when no response was produced.
    async fn invoke(&self, kind: OracleKind, request: &serde_json::Value) -> DomainResult<String>;

    /// Drop any state carried between calls (browser session, cookies).
    async fn reset_session(&self) -> DomainResult<()> {
        Ok(())
    }
}
