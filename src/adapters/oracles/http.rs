//! Oracle backed by an HTTP endpoint.
//!
//! Each call POSTs `{"kind": ..., "request": ...}` to the configured URL; the
//! response body is the oracle's answer. Session resets POST
//! `{"kind": "reset_session"}` to the same URL.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;

use super::command::DEFAULT_ORACLE_TIMEOUT;
use super::rate_limit::OracleRateLimiter;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::OracleKind;
use crate::domain::ports::Oracle;

pub struct HttpOracle {
    name: String,
    url: String,
    http_client: ReqwestClient,
    rate_limiter: Option<OracleRateLimiter>,
}

impl HttpOracle {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Option<Duration>) -> DomainResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(timeout.unwrap_or(DEFAULT_ORACLE_TIMEOUT))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            http_client,
            rate_limiter: None,
        })
    }

    pub fn with_rate_limiter(mut self, limiter: Option<OracleRateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    fn crash(&self, reason: impl Into<String>) -> DomainError {
        DomainError::OracleTimeoutOrCrash {
            oracle: self.name.clone(),
            reason: reason.into(),
        }
    }

    async fn post(&self, body: &serde_json::Value) -> DomainResult<String> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let response = self
            .http_client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.crash("request timed out")
                } else {
                    self.crash(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.crash(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(self.crash(format!("HTTP {status}: {}", text.chars().take(500).collect::<String>())));
        }
        Ok(text)
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, kind: OracleKind, request: &serde_json::Value) -> DomainResult<String> {
        let text = self
            .post(&serde_json::json!({ "kind": kind, "request": request }))
            .await?;
        tracing::debug!(oracle = %self.name, kind = %kind, bytes = text.len(), "oracle responded");
        Ok(text)
    }

    async fn reset_session(&self) -> DomainResult<()> {
        self.post(&serde_json::json!({ "kind": "reset_session" })).await?;
        Ok(())
    }
}
