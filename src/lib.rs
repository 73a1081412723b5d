//! fixloop - autonomous test, diagnose, fix and merge loop
//!
//! fixloop runs a persona × scenario test matrix against a system under test
//! through a pool of workers, clusters the failures, asks a diagnosis oracle
//! for fix specs, runs one fix task per cluster and merges the changes they
//! need in shared files. It repeats until everything passes or the loop
//! stalls.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, invariants and port traits
//! - **Adapter Layer** (`adapters`): SQLite repositories and oracle backings
//! - **Service Layer** (`services`): the loop stages and the control loop
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::Config;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::control_loop::{ControlLoop, LoopDependencies, LoopOutcome, LoopSettings, LoopSummary};
