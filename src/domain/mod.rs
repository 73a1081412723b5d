//! Domain layer for the fixloop control loop.
//!
//! Pure data types, invariants and the port traits that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
