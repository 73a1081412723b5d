//! Adapters implementing the domain ports.

pub mod oracles;
pub mod sqlite;
