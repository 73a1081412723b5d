use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project config file, created by the user next to the system under test.
pub const PROJECT_CONFIG_PATH: &str = ".fixloop/config.yaml";
/// Optional local overrides, not meant to be committed.
pub const LOCAL_CONFIG_PATH: &str = ".fixloop/local.yaml";
pub const ENV_PREFIX: &str = "FIXLOOP_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid worker count: {0}. Must be at least 1")]
    InvalidWorkerCount(usize),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid burst_size: {0}. Must be at least 1")]
    InvalidBurstSize(u32),

    #[error("Invalid circuit breaker threshold: {0}. Must be at least 2")]
    InvalidThreshold(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("File '{file}' is owned by cluster '{cluster}' and also listed as shared")]
    OwnedAndShared { file: String, cluster: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .fixloop/config.yaml
    /// 3. .fixloop/local.yaml (optional)
    /// 4. Environment variables (FIXLOOP_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        Self::load_with(None)
    }

    /// Like [`load`](Self::load), but an explicit file replaces the two
    /// project files when given.
    pub fn load_with(explicit: Option<&Path>) -> Result<Config> {
        let config: Config = Self::figment(explicit)
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// The provider stack, exposed so callers can inspect or extend it.
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = match explicit {
            Some(path) => figment.merge(Yaml::file(path)),
            None => figment
                .merge(Yaml::file(PROJECT_CONFIG_PATH))
                .merge(Yaml::file(LOCAL_CONFIG_PATH)),
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.workers.count == 0 {
            return Err(ConfigError::InvalidWorkerCount(config.workers.count));
        }
        if config.workers.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers.max_attempts must be at least 1".to_string(),
            ));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.rate_limit.requests_per_second <= 0.0 || !config.rate_limit.requests_per_second.is_finite() {
            return Err(ConfigError::InvalidRateLimit(config.rate_limit.requests_per_second));
        }
        if config.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(config.rate_limit.burst_size));
        }

        let breaker = &config.circuit_breaker;
        if breaker.threshold < 2 {
            return Err(ConfigError::InvalidThreshold(breaker.threshold));
        }
        if breaker.initial_backoff_ms >= breaker.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                breaker.initial_backoff_ms,
                breaker.max_backoff_ms,
            ));
        }
        if breaker.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "circuit_breaker.max_attempts must be at least 1".to_string(),
            ));
        }

        if config.loop_config.max_iterations == 0 {
            return Err(ConfigError::ValidationFailed(
                "loop.max_iterations must be at least 1".to_string(),
            ));
        }
        if config.fix.task_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "fix.task_timeout_secs must be at least 1".to_string(),
            ));
        }

        Self::validate_ownership(&config.ownership.clusters, &config.ownership.shared)?;

        Ok(())
    }

    fn validate_ownership(
        clusters: &BTreeMap<String, Vec<String>>,
        shared: &[String],
    ) -> Result<(), ConfigError> {
        for (cluster, files) in clusters {
            if let Some(file) = files.iter().find(|f| shared.contains(f)) {
                return Err(ConfigError::OwnedAndShared {
                    file: file.clone(),
                    cluster: cluster.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{LauncherKind, RetestScope};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workers.count, 3);
        assert_eq!(config.workers.max_attempts, 2);
        assert_eq!(config.database.path, ".fixloop/fixloop.db");
        assert_eq!(config.circuit_breaker.threshold, 3);
        assert_eq!(config.extraction.max_text_chars, 400);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
workers:
  count: 6
  launcher: in_process
loop:
  max_iterations: 4
  retest: failing_only
clusters:
  invoices: [create-invoice, send-invoice]
ownership:
  clusters:
    invoices: [src/invoices.rs]
  shared: [src/routes.rs]
oracles:
  test:
    kind: command
    command: ./oracles/test.sh
  diagnosis:
    kind: http
    url: http://localhost:8088/diagnose
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.workers.count, 6);
        assert_eq!(config.workers.launcher, LauncherKind::InProcess);
        assert_eq!(config.loop_config.max_iterations, 4);
        assert_eq!(config.loop_config.retest, RetestScope::FailingOnly);
        assert_eq!(config.clusters["invoices"].len(), 2);
        assert!(config.oracles.test.is_configured());
        assert!(config.oracles.diagnosis.is_configured());
        assert!(!config.oracles.fix.is_configured());
        assert_eq!(config.logging.level, "info", "unset sections keep defaults");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.workers.count = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidWorkerCount(0))
        ));
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRateLimit(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_validate_threshold_below_two() {
        let mut config = Config::default();
        config.circuit_breaker.threshold = 1;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidThreshold(1))
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.circuit_breaker.initial_backoff_ms = 30_000;
        config.circuit_breaker.max_backoff_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(30_000, 10_000))
        ));
    }

    #[test]
    fn test_validate_owned_and_shared_file() {
        let mut config = Config::default();
        config
            .ownership
            .clusters
            .insert("nav".to_string(), vec!["src/nav.ts".to_string()]);
        config.ownership.shared = vec!["src/nav.ts".to_string()];

        match ConfigLoader::validate(&config) {
            Err(ConfigError::OwnedAndShared { file, cluster }) => {
                assert_eq!(file, "src/nav.ts");
                assert_eq!(cluster, "nav");
            }
            other => panic!("Expected OwnedAndShared error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("FIXLOOP_WORKERS__COUNT", Some("7")),
                ("FIXLOOP_LOGGING__LEVEL", Some("debug")),
                ("FIXLOOP_LOOP__RETEST", Some("failing_only")),
            ],
            || {
                let missing = Path::new("/nonexistent/fixloop.yaml");
                let config: Config = ConfigLoader::figment(Some(missing)).extract().unwrap();
                assert_eq!(config.workers.count, 7);
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.loop_config.retest, RetestScope::FailingOnly);
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "workers:\n  count: 5\nlogging:\n  level: info\n  format: json").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "workers:\n  count: 9\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.workers.count, 9, "Override should win");
        assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
        assert_eq!(config.logging.format, "json", "Base value should persist when not overridden");
        assert_eq!(config.workers.max_attempts, 2, "Defaults fill the rest");
    }

    #[test]
    fn test_load_with_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "database:\n  path: /tmp/fixloop-test.db\nlogging:\n  format: xml").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_with(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Invalid log format"));
    }
}
