//! CLI command implementations.

pub mod guard;
pub mod metrics;
pub mod roster;
pub mod run;
pub mod status;
pub mod unfixable;
pub mod worker;
