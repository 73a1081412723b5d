//! Implementation of the `fixloop guard` command.
//!
//! Re-runs an external command until it succeeds. Identical consecutive
//! failures open the circuit and stop the retries early.

use anyhow::{bail, Result};
use clap::Args;
use std::time::Duration;

use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::Config;
use crate::services::circuit_breaker::{run_command_once, run_guarded, CircuitBreaker, CircuitBreakerConfig, GuardOutcome};

/// Exit code when the circuit opened.
pub const EXIT_CIRCUIT_OPEN: i32 = 3;

#[derive(Args, Debug)]
pub struct GuardArgs {
    /// Identical consecutive failures that open the circuit
    #[arg(long)]
    pub threshold: Option<u32>,

    /// Upper bound on attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Command and arguments, after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl GuardArgs {
    pub fn breaker_config(&self, config: &Config) -> CircuitBreakerConfig {
        let mut breaker = CircuitBreakerConfig::from(&config.circuit_breaker);
        if let Some(threshold) = self.threshold {
            breaker.threshold = threshold;
        }
        if let Some(max_attempts) = self.max_attempts {
            breaker.max_attempts = max_attempts;
        }
        breaker
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GuardOutput {
    Succeeded {
        attempts: u32,
        output: String,
    },
    CircuitOpen {
        attempts: u32,
        signature: String,
        classification: String,
        output: String,
    },
    AttemptsExhausted {
        attempts: u32,
        classification: String,
        output: String,
    },
}

impl GuardOutput {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded { .. } => 0,
            Self::CircuitOpen { .. } => EXIT_CIRCUIT_OPEN,
            Self::AttemptsExhausted { .. } => crate::cli::EXIT_INTERNAL_ERROR,
        }
    }
}

impl From<GuardOutcome<String>> for GuardOutput {
    fn from(outcome: GuardOutcome<String>) -> Self {
        match outcome {
            GuardOutcome::Succeeded { value, attempts } => Self::Succeeded { attempts, output: value },
            GuardOutcome::CircuitOpen {
                signature,
                attempts,
                last_failure,
            } => Self::CircuitOpen {
                attempts,
                signature,
                classification: last_failure.classification,
                output: last_failure.output,
            },
            GuardOutcome::AttemptsExhausted { attempts, last_failure } => Self::AttemptsExhausted {
                attempts,
                classification: last_failure.classification,
                output: last_failure.output,
            },
        }
    }
}

impl CommandOutput for GuardOutput {
    fn to_human(&self) -> String {
        match self {
            Self::Succeeded { attempts, output } => {
                format!("Succeeded after {attempts} attempt(s)\n{output}")
            }
            Self::CircuitOpen {
                attempts,
                signature,
                classification,
                output,
            } => format!(
                "{} after {attempts} attempt(s): {classification}\nsignature {signature}\n{}",
                console::style("Circuit open").red().bold(),
                truncate(output, 2000)
            ),
            Self::AttemptsExhausted {
                attempts,
                classification,
                output,
            } => format!(
                "Gave up after {attempts} attempt(s): {classification}\n{}",
                truncate(output, 2000)
            ),
        }
    }
}

pub async fn execute(args: GuardArgs, config: &Config, json_mode: bool) -> Result<i32> {
    let Some((program, rest)) = args.command.split_first() else {
        bail!("guard needs a command after `--`");
    };
    let mut breaker = CircuitBreaker::new(args.breaker_config(config));
    let timeout = args.timeout_secs.map(Duration::from_secs);

    let outcome = run_guarded(&mut breaker, |attempt| {
        tracing::info!(attempt, program = %program, "Running guarded command");
        run_command_once(program, rest, timeout)
    })
    .await;

    let result = GuardOutput::from(outcome);
    output(&result, json_mode);
    Ok(result.exit_code())
}
