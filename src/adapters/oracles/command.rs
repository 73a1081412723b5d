//! Oracle backed by an external program.
//!
//! The request envelope `{"kind": ..., "request": ...}` is written to the
//! program's stdin; whatever it prints on stdout is the response. Each call
//! is a fresh process, so there is no session to reset.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::rate_limit::OracleRateLimiter;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::OracleKind;
use crate::domain::ports::Oracle;

/// Default wall-clock limit for one oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Bytes of stderr kept in crash errors.
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Debug, Clone)]
pub struct CommandOracleConfig {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandOracleConfig {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_ORACLE_TIMEOUT,
            working_dir: None,
            env: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

pub struct CommandOracle {
    config: CommandOracleConfig,
    rate_limiter: Option<OracleRateLimiter>,
}

impl CommandOracle {
    pub fn new(config: CommandOracleConfig) -> Self {
        Self {
            config,
            rate_limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Option<OracleRateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    fn crash(&self, reason: impl Into<String>) -> DomainError {
        DomainError::OracleTimeoutOrCrash {
            oracle: self.config.name.clone(),
            reason: reason.into(),
        }
    }
}

fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[async_trait]
impl Oracle for CommandOracle {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(&self, kind: OracleKind, request: &serde_json::Value) -> DomainResult<String> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let payload = serde_json::to_vec(&serde_json::json!({
            "kind": kind,
            "request": request,
        }))?;

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .env("FIXLOOP_ORACLE_KIND", kind.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| self.crash(format!("failed to spawn {}: {e}", self.config.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.crash("failed to capture stdin"))?;
        let writer = tokio::spawn(async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        });

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| self.crash(format!("failed to wait for process: {e}")))?,
            Err(_) => {
                return Err(self.crash(format!(
                    "no response within {}s",
                    self.config.timeout.as_secs()
                )))
            }
        };

        if let Ok(Err(e)) = writer.await {
            tracing::debug!(oracle = %self.config.name, error = %e, "oracle did not consume the full request");
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = output
                .status
                .code()
                .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
            return Err(self.crash(format!("{status}: {}", tail(stderr.trim(), STDERR_TAIL_BYTES))));
        }

        tracing::debug!(oracle = %self.config.name, kind = %kind, bytes = stdout.len(), "oracle responded");
        Ok(stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(name: &str, script: &str) -> CommandOracle {
        CommandOracle::new(
            CommandOracleConfig::new(name, "sh").with_args(vec!["-c".to_string(), script.to_string()]),
        )
    }

    #[tokio::test]
    async fn test_request_goes_to_stdin_and_stdout_comes_back() {
        let oracle = sh("echo", "cat");
        let response = oracle
            .invoke(OracleKind::Diagnosis, &serde_json::json!({"clusters": {}}))
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&response).unwrap();
        assert_eq!(parsed["kind"], "diagnosis");
        assert_eq!(parsed["request"]["clusters"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_crash() {
        let oracle = sh("broken", "echo boom >&2; exit 3");
        let err = oracle.invoke(OracleKind::Fix, &serde_json::json!({})).await.unwrap_err();
        match err {
            DomainError::OracleTimeoutOrCrash { oracle, reason } => {
                assert_eq!(oracle, "broken");
                assert!(reason.contains("exit code 3"));
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_a_crash() {
        let oracle = CommandOracle::new(
            CommandOracleConfig::new("slow", "sh")
                .with_args(vec!["-c".to_string(), "sleep 5".to_string()])
                .with_timeout(Duration::from_millis(100)),
        );
        let err = oracle.invoke(OracleKind::Test, &serde_json::json!({})).await.unwrap_err();
        assert!(err.is_oracle_failure());
    }

    #[tokio::test]
    async fn test_missing_program_is_a_crash() {
        let oracle = CommandOracle::new(CommandOracleConfig::new("ghost", "/nonexistent/fixloop-oracle"));
        let err = oracle.invoke(OracleKind::Test, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, DomainError::OracleTimeoutOrCrash { .. }));
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ééé", 3), "é");
    }
}
