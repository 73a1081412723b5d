//! Strict-schema wrappers around the [`Oracle`] port.
//!
//! Oracles answer with free text. The typed call pulls the outermost JSON
//! object out of that text, deserializes it into the expected response type
//! and retries a bounded number of times when the answer does not fit.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::OracleKind;
use crate::domain::ports::Oracle;

/// Slice of `text` from its first `{` to its last `}`.
///
/// Oracles often wrap the object in prose or code fences; everything outside
/// the outermost brace span is ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse an oracle answer into `T`.
pub fn parse_response<T: DeserializeOwned>(oracle: &str, text: &str) -> DomainResult<T> {
    let json = extract_json_object(text).ok_or_else(|| DomainError::OracleMalformedOutput {
        oracle: oracle.to_string(),
        reason: "no JSON object in response".to_string(),
    })?;

    serde_json::from_str(json).map_err(|e| DomainError::OracleMalformedOutput {
        oracle: oracle.to_string(),
        reason: e.to_string(),
    })
}

/// Invoke `oracle` and parse its answer into `T`, making at most `attempts` calls.
///
/// Only malformed output is retried. A timeout or crash is returned at once,
/// as is the last malformed-output error when every attempt failed.
pub async fn call_typed<Req, Resp>(
    oracle: &dyn Oracle,
    kind: OracleKind,
    request: &Req,
    attempts: u32,
) -> DomainResult<Resp>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_value(request)?;
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let text = oracle.invoke(kind, &payload).await?;
        match parse_response(oracle.name(), &text) {
            Ok(response) => return Ok(response),
            Err(e) => {
                tracing::warn!(
                    oracle = oracle.name(),
                    kind = %kind,
                    attempt,
                    error = %e,
                    "Oracle response did not match the expected schema"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| DomainError::OracleMalformedOutput {
        oracle: oracle.name().to_string(),
        reason: "no attempt made".to_string(),
    }))
}
