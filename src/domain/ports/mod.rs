//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the async trait interfaces adapters implement:
//! - RosterRepository: personas and scenarios
//! - ResultRepository: test instances and their step details
//! - UnfixableRepository: the append-only blacklist
//! - MetricsRepository: per-iteration convergence history
//! - Oracle: external judgment (test, diagnosis, fix, merge)

pub mod metrics_repository;
pub mod oracle;
pub mod result_repository;
pub mod roster_repository;
pub mod unfixable_repository;

pub use metrics_repository::MetricsRepository;
pub use oracle::Oracle;
pub use result_repository::{ResultRepository, StatusCount};
pub use roster_repository::RosterRepository;
pub use unfixable_repository::UnfixableRepository;
