//! Infrastructure layer module
//!
//! Cross-cutting concerns the adapters and services rely on:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)

pub mod config;
pub mod logging;
