//! Oracle adapters: external programs, HTTP endpoints and a scripted mock.

pub mod command;
pub mod http;
pub mod mock;
pub mod rate_limit;
pub mod registry;

pub use command::{CommandOracle, CommandOracleConfig};
pub use http::HttpOracle;
pub use mock::{MockOracle, MockReply};
pub use rate_limit::OracleRateLimiter;
pub use registry::{OracleRegistry, OracleSet};
