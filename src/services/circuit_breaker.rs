//! Circuit breaker for retried commands.
//!
//! Every failed attempt is reduced to a signature: a SHA-256 over its error
//! classification and a bounded prefix of its output. When the last
//! `threshold` signatures are identical the circuit opens and retrying stops,
//! because the command keeps failing the same way. Between attempts the
//! breaker backs off exponentially up to a ceiling.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::domain::models::CircuitBreakerSettings;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Identical consecutive signatures that open the circuit.
    pub threshold: u32,
    /// Bytes of output that go into a signature.
    pub prefix_bytes: usize,
    /// Wait after the first failure.
    pub initial_backoff: Duration,
    /// Ceiling for the doubling backoff.
    pub max_backoff: Duration,
    /// Attempts allowed even when signatures keep changing.
    pub max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&CircuitBreakerSettings::default())
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            threshold: settings.threshold,
            prefix_bytes: settings.prefix_bytes,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            max_attempts: settings.max_attempts,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a breaker that does not wait between attempts.
    pub fn immediate(threshold: u32, max_attempts: u32) -> Self {
        Self {
            threshold,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_attempts,
            ..Self::default()
        }
    }
}

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Retries are allowed.
    Closed,
    /// The same failure repeated; retries are blocked.
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Short stable class, e.g. `exit:1` or `synthesis_failed`.
    pub classification: String,
    /// Output of the failed attempt (stderr first for commands).
    pub output: String,
}

impl AttemptFailure {
    pub fn new(classification: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            classification: classification.into(),
            output: output.into(),
        }
    }
}

/// Hex SHA-256 over the classification and at most `prefix_bytes` of output.
pub fn failure_signature(classification: &str, output: &str, prefix_bytes: usize) -> String {
    let bytes = output.as_bytes();
    let prefix = &bytes[..bytes.len().min(prefix_bytes)];

    let mut hasher = Sha256::new();
    hasher.update(classification.as_bytes());
    hasher.update([0u8]);
    hasher.update(prefix);
    hex::encode(hasher.finalize())
}

/// Signature-tracking circuit breaker for one retried command.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    recent: VecDeque<String>,
    state: CircuitState,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.threshold as usize),
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    /// Signature of the most recent failure.
    pub fn last_signature(&self) -> Option<&str> {
        self.recent.back().map(String::as_str)
    }

    /// Record a failure and return its signature. May open the circuit.
    pub fn record_failure(&mut self, failure: &AttemptFailure) -> String {
        let signature = failure_signature(&failure.classification, &failure.output, self.config.prefix_bytes);
        self.consecutive_failures += 1;

        let window = self.config.threshold.max(1) as usize;
        if self.recent.len() == window {
            self.recent.pop_front();
        }
        self.recent.push_back(signature.clone());

        if self.recent.len() == window && self.recent.iter().all(|s| *s == signature) {
            if self.state != CircuitState::Open {
                tracing::warn!(
                    signature = %signature,
                    classification = %failure.classification,
                    repeats = window,
                    "Circuit opened on repeated failure"
                );
            }
            self.state = CircuitState::Open;
        }
        signature
    }

    /// Forget the failure history after a success.
    pub fn record_success(&mut self) {
        self.recent.clear();
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    /// Wait before the next attempt, given the failures seen so far.
    pub fn backoff(&self) -> Duration {
        let exponent = self.consecutive_failures.saturating_sub(1).min(31);
        self.config
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.config.max_backoff)
    }
}

/// How a guarded run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    /// The same failure repeated `threshold` times.
    CircuitOpen {
        signature: String,
        attempts: u32,
        last_failure: AttemptFailure,
    },
    /// `max_attempts` reached with changing failures.
    AttemptsExhausted { attempts: u32, last_failure: AttemptFailure },
}

impl<T> GuardOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::CircuitOpen { attempts, .. }
            | Self::AttemptsExhausted { attempts, .. } => *attempts,
        }
    }
}

/// Run `op` until it succeeds, the circuit opens or attempts run out.
///
/// `op` receives the 1-based attempt number.
pub async fn run_guarded<T, F, Fut>(breaker: &mut CircuitBreaker, mut op: F) -> GuardOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptFailure>>,
{
    let max_attempts = breaker.config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                breaker.record_success();
                return GuardOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(failure) => {
                let signature = breaker.record_failure(&failure);
                if breaker.is_open() {
                    return GuardOutcome::CircuitOpen {
                        signature,
                        attempts: attempt,
                        last_failure: failure,
                    };
                }
                if attempt >= max_attempts {
                    return GuardOutcome::AttemptsExhausted {
                        attempts: attempt,
                        last_failure: failure,
                    };
                }

                let wait = breaker.backoff();
                tracing::info!(
                    attempt,
                    classification = %failure.classification,
                    backoff_ms = wait.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Run an external command once, classifying a failure.
///
/// Classifications: `spawn_failed`, `timeout`, `exit:<code>` and `signal`.
/// On success the captured stdout is returned.
pub async fn run_command_once(
    program: &str,
    args: &[String],
    timeout: Option<Duration>,
) -> Result<String, AttemptFailure> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AttemptFailure::new("spawn_failed", e.to_string()))?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| AttemptFailure::new("timeout", format!("no exit within {}s", limit.as_secs_f64())))?,
        None => child.wait_with_output().await,
    }
    .map_err(|e| AttemptFailure::new("spawn_failed", e.to_string()))?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stdout));
    let classification = match output.status.code() {
        Some(code) => format!("exit:{code}"),
        None => "signal".to_string(),
    };
    Err(AttemptFailure::new(classification, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(output: &str) -> AttemptFailure {
        AttemptFailure::new("exit:1", output)
    }

    #[test]
    fn test_three_identical_failures_open_the_circuit() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::immediate(3, 10));
        breaker.record_failure(&failure("A"));
        breaker.record_failure(&failure("A"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure(&failure("A"));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_changing_failure_never_opens() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::immediate(3, 10));
        for output in ["A", "A", "B"] {
            breaker.record_failure(&failure(output));
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_success_resets_history() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::immediate(3, 10));
        breaker.record_failure(&failure("A"));
        breaker.record_failure(&failure("A"));
        breaker.record_success();
        breaker.record_failure(&failure("A"));
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_signature_uses_bounded_prefix() {
        let a = failure_signature("exit:1", &format!("{}tail-one", "x".repeat(512)), 512);
        let b = failure_signature("exit:1", &format!("{}tail-two", "x".repeat(512)), 512);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, failure_signature("exit:2", &"x".repeat(512), 512));
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
            threshold: 3,
            prefix_bytes: 512,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            max_attempts: 10,
        });
        let mut waits = Vec::new();
        for i in 0..5 {
            breaker.record_failure(&failure(&i.to_string()));
            waits.push(breaker.backoff().as_secs());
        }
        assert_eq!(waits, vec![1, 2, 4, 5, 5]);
    }

    #[tokio::test]
    async fn test_run_guarded_stops_when_circuit_opens() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::immediate(3, 10));
        let outcome: GuardOutcome<()> = run_guarded(&mut breaker, |_| async { Err(failure("same")) }).await;

        match outcome {
            GuardOutcome::CircuitOpen { attempts, signature, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(signature, failure_signature("exit:1", "same", 512));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_guarded_bounded_by_max_attempts() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::immediate(3, 4));
        let outcome: GuardOutcome<()> =
            run_guarded(&mut breaker, |n| async move { Err(failure(&format!("attempt {n}"))) }).await;
        assert!(matches!(outcome, GuardOutcome::AttemptsExhausted { attempts: 4, .. }));
    }

    #[tokio::test]
    async fn test_run_guarded_succeeds_after_retry() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::immediate(3, 10));
        let outcome = run_guarded(&mut breaker, |n| async move {
            if n < 2 {
                Err(failure("flaky"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(outcome, GuardOutcome::Succeeded { value: 2, attempts: 2 });
        assert!(!breaker.is_open());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_classification() {
        let exit = run_command_once("sh", &["-c".to_string(), "echo bad >&2; exit 3".to_string()], None)
            .await
            .unwrap_err();
        assert_eq!(exit.classification, "exit:3");
        assert!(exit.output.contains("bad"));

        let missing = run_command_once("/definitely/not/here", &[], None).await.unwrap_err();
        assert_eq!(missing.classification, "spawn_failed");

        let slow = run_command_once("sleep", &["5".to_string()], Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(slow.classification, "timeout");

        let ok = run_command_once("echo", &["hi".to_string()], None).await.unwrap();
        assert_eq!(ok.trim(), "hi");
    }
}
