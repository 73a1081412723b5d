use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::models::LoggingConfig;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Console output format (json, pretty)
    pub format: LogFormat,

    /// Directory for log files; console only when None
    pub log_dir: Option<PathBuf>,

    /// Enable console (stderr) logging
    pub enable_console: bool,

    pub rotation: RotationPolicy,

    /// Log retention in days
    pub retention_days: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: None,
            enable_console: true,
            rotation: RotationPolicy::default(),
            retention_days: 30,
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: LogFormat::from_str(&config.format).unwrap_or(LogFormat::Pretty),
            log_dir: config.log_dir.as_ref().map(PathBuf::from),
            enable_console: true,
            rotation: RotationPolicy::Daily,
            retention_days: config.retention_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_logging_config() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "JSON".to_string(),
            retention_days: 7,
            log_dir: Some(".fixloop/logs".to_string()),
        };
        let config = LogConfig::from(&logging);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir, Some(PathBuf::from(".fixloop/logs")));
        assert_eq!(config.retention_days, 7);
    }
}
