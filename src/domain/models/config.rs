use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure for fixloop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Oracle rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Test worker pool configuration
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Control loop configuration
    #[serde(default, rename = "loop")]
    pub loop_config: LoopConfig,

    /// Failure payload trimming
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Fix stage configuration
    #[serde(default)]
    pub fix: FixConfig,

    /// Command-level circuit breaker configuration
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Oracle backings
    #[serde(default)]
    pub oracles: OraclesConfig,

    /// Cluster name -> scenario ids
    #[serde(default)]
    pub clusters: BTreeMap<String, Vec<String>>,

    /// Owned/shared file partition for fix tasks
    #[serde(default)]
    pub ownership: OwnershipConfig,

    /// Roster file imported at the start of a run
    #[serde(default)]
    pub roster_path: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".fixloop/fixloop.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
            log_dir: None,
        }
    }
}

/// Rate limiting configuration, applied per oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// How test workers are launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LauncherKind {
    /// One `fixloop worker` OS process per batch
    Process,
    /// One tokio task per batch inside the current process
    InProcess,
}

impl Default for LauncherKind {
    fn default() -> Self {
        Self::Process
    }
}

/// Test worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Number of parallel workers
    #[serde(default = "default_worker_count")]
    pub count: usize,

    #[serde(default)]
    pub launcher: LauncherKind,

    /// Step count assumed for exploratory scenarios when sizing the action budget
    #[serde(default = "default_exploratory_step_estimate")]
    pub exploratory_step_estimate: u32,

    /// Oracle attempts per pair before recording `error`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// System under test, passed to the test oracle
    #[serde(default = "default_target")]
    pub target: String,

    /// Where the test oracle drops screenshots and traces
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
}

const fn default_worker_count() -> usize {
    3
}

const fn default_exploratory_step_estimate() -> u32 {
    8
}

const fn default_max_attempts() -> u32 {
    2
}

fn default_target() -> String {
    "http://localhost:3000".to_string()
}

fn default_artifact_dir() -> String {
    ".fixloop/artifacts".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            launcher: LauncherKind::default(),
            exploratory_step_estimate: default_exploratory_step_estimate(),
            max_attempts: default_max_attempts(),
            target: default_target(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

/// Which pairs an iteration after the first re-runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetestScope {
    /// Every pair of the matrix
    Full,
    /// Only pairs whose latest result is not a pass
    FailingOnly,
}

impl Default for RetestScope {
    fn default() -> Self {
        Self::Full
    }
}

/// Control loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoopConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-run working directory (outcome files, reports, escalation)
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    #[serde(default)]
    pub retest: RetestScope,
}

const fn default_max_iterations() -> u32 {
    10
}

fn default_work_dir() -> String {
    ".fixloop/runs".to_string()
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            work_dir: default_work_dir(),
            retest: RetestScope::default(),
        }
    }
}

/// Failure payload trimming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractionConfig {
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    #[serde(default = "default_max_steps_per_failure")]
    pub max_steps_per_failure: usize,
}

const fn default_max_text_chars() -> usize {
    400
}

const fn default_max_steps_per_failure() -> usize {
    20
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
            max_steps_per_failure: default_max_steps_per_failure(),
        }
    }
}

/// Fix stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FixConfig {
    /// Wall-clock limit per fix task
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

const fn default_task_timeout_secs() -> u64 {
    1800
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

/// Command-level circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerSettings {
    /// Identical consecutive signatures that open the circuit
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Bytes of failure output hashed into the signature
    #[serde(default = "default_prefix_bytes")]
    pub prefix_bytes: usize,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Hard bound on attempts even when signatures keep changing
    #[serde(default = "default_breaker_max_attempts")]
    pub max_attempts: u32,
}

const fn default_threshold() -> u32 {
    3
}

const fn default_prefix_bytes() -> usize {
    512
}

const fn default_initial_backoff_ms() -> u64 {
    1_000
}

const fn default_max_backoff_ms() -> u64 {
    60_000
}

const fn default_breaker_max_attempts() -> u32 {
    10
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            prefix_bytes: default_prefix_bytes(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_breaker_max_attempts(),
        }
    }
}

/// Backing implementation of an oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleBackend {
    /// Spawn a program; request on stdin, response on stdout
    Command,
    /// POST the request to a URL; the body is the response
    Http,
}

impl Default for OracleBackend {
    fn default() -> Self {
        Self::Command
    }
}

/// One oracle backing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OracleConfig {
    #[serde(default)]
    pub kind: OracleBackend,

    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub url: Option<String>,

    /// Per-call timeout; zero means the default of ten minutes
    #[serde(default)]
    pub timeout_secs: u64,
}

impl OracleConfig {
    pub fn is_configured(&self) -> bool {
        match self.kind {
            OracleBackend::Command => self.command.as_deref().is_some_and(|c| !c.is_empty()),
            OracleBackend::Http => self.url.as_deref().is_some_and(|u| !u.is_empty()),
        }
    }
}

/// Oracle backings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OraclesConfig {
    #[serde(default)]
    pub test: OracleConfig,

    #[serde(default)]
    pub diagnosis: OracleConfig,

    #[serde(default)]
    pub fix: OracleConfig,

    /// Optional; free-form shared-file changes are requeued without it
    #[serde(default)]
    pub merge: Option<OracleConfig>,
}

/// Owned/shared file partition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OwnershipConfig {
    /// Root the file paths are relative to
    #[serde(default = "default_ownership_root")]
    pub root: String,

    /// Cluster name -> files the cluster may edit
    #[serde(default)]
    pub clusters: BTreeMap<String, Vec<String>>,

    /// Files only the merge stage may write
    #[serde(default)]
    pub shared: Vec<String>,
}

fn default_ownership_root() -> String {
    ".".to_string()
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            root: default_ownership_root(),
            clusters: BTreeMap::new(),
            shared: Vec::new(),
        }
    }
}
