//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Daily rolling JSON files with retention cleanup
//! - Secret scrubbing for payloads that leave the process

pub mod config;
pub mod logger;
pub mod retention;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use retention::cleanup_old_logs;
pub use secret_scrubbing::SecretScrubber;
