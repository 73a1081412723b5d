//! Builds the oracle set from configuration.

use std::sync::Arc;
use std::time::Duration;

use super::command::{CommandOracle, CommandOracleConfig};
use super::http::HttpOracle;
use super::rate_limit::OracleRateLimiter;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{OracleBackend, OracleConfig, OracleKind, OraclesConfig, RateLimitConfig};
use crate::domain::ports::Oracle;

/// The four oracles the loop talks to. The merge oracle is optional.
#[derive(Clone)]
pub struct OracleSet {
    pub test: Arc<dyn Oracle>,
    pub diagnosis: Arc<dyn Oracle>,
    pub fix: Arc<dyn Oracle>,
    pub merge: Option<Arc<dyn Oracle>>,
}

impl OracleSet {
    /// Same oracle behind every role; used by tests and single-backend setups.
    pub fn uniform(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            test: oracle.clone(),
            diagnosis: oracle.clone(),
            fix: oracle.clone(),
            merge: Some(oracle),
        }
    }
}

pub struct OracleRegistry {
    rate_limit: RateLimitConfig,
}

impl OracleRegistry {
    pub fn new(rate_limit: RateLimitConfig) -> Self {
        Self { rate_limit }
    }

    /// Create one oracle from its configuration.
    pub fn create(&self, kind: OracleKind, config: &OracleConfig) -> DomainResult<Arc<dyn Oracle>> {
        if !config.is_configured() {
            return Err(DomainError::ValidationFailed(format!(
                "oracles.{kind} is not configured (set {})",
                match config.kind {
                    OracleBackend::Command => "command",
                    OracleBackend::Http => "url",
                }
            )));
        }

        let name = format!("{kind}-oracle");
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let limiter = OracleRateLimiter::from_config(&self.rate_limit);

        match config.kind {
            OracleBackend::Command => {
                let program = config.command.clone().unwrap_or_default();
                let mut command_config = CommandOracleConfig::new(name, program).with_args(config.args.clone());
                if let Some(timeout) = timeout {
                    command_config = command_config.with_timeout(timeout);
                }
                Ok(Arc::new(CommandOracle::new(command_config).with_rate_limiter(limiter)))
            }
            OracleBackend::Http => {
                let url = config.url.clone().unwrap_or_default();
                Ok(Arc::new(HttpOracle::new(name, url, timeout)?.with_rate_limiter(limiter)))
            }
        }
    }

    /// Create the test oracle only; that is all a worker process needs.
    pub fn create_test_oracle(&self, config: &OraclesConfig) -> DomainResult<Arc<dyn Oracle>> {
        self.create(OracleKind::Test, &config.test)
    }

    pub fn create_set(&self, config: &OraclesConfig) -> DomainResult<OracleSet> {
        Ok(OracleSet {
            test: self.create(OracleKind::Test, &config.test)?,
            diagnosis: self.create(OracleKind::Diagnosis, &config.diagnosis)?,
            fix: self.create(OracleKind::Fix, &config.fix)?,
            merge: config
                .merge
                .as_ref()
                .map(|merge| self.create(OracleKind::Merge, merge))
                .transpose()?,
        })
    }
}
