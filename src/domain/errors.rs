//! Domain errors for the fixloop control loop.

use thiserror::Error;

/// Domain-level errors that can occur anywhere in the loop.
///
/// A stall is a [`LoopOutcome`](crate::services::control_loop::LoopOutcome)
/// and a merge conflict is a row in the merge report; neither appears here.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Oracle {oracle} returned malformed output: {reason}")]
    OracleMalformedOutput { oracle: String, reason: String },

    #[error("Oracle {oracle} timed out or crashed: {reason}")]
    OracleTimeoutOrCrash { oracle: String, reason: String },

    #[error("Persistence write failed: {0}")]
    PersistenceWriteFailure(String),

    #[error("Circuit open after {attempts} attempts, repeated failure signature {signature}")]
    CircuitOpen { signature: String, attempts: u32 },

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Persona not found: {0}")]
    PersonaNotFound(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl DomainError {
    /// Short, stable classification used for failure signatures.
    pub fn classification(&self) -> &'static str {
        match self {
            Self::OracleMalformedOutput { .. } => "oracle_malformed_output",
            Self::OracleTimeoutOrCrash { .. } => "oracle_timeout_or_crash",
            Self::PersistenceWriteFailure(_) => "persistence_write_failure",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::SynthesisFailed(_) => "synthesis_failed",
            Self::PersonaNotFound(_) | Self::ScenarioNotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::DatabaseError(_) => "database_error",
            Self::SerializationError(_) => "serialization_error",
            Self::Io(_) => "io_error",
            Self::ExecutionFailed(_) => "execution_failed",
        }
    }

    /// Whether the failure came from an oracle (and is recorded as a test `error`).
    pub fn is_oracle_failure(&self) -> bool {
        matches!(
            self,
            Self::OracleMalformedOutput { .. } | Self::OracleTimeoutOrCrash { .. }
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}
