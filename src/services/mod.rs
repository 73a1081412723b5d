//! Loop services: the test fan-out, failure processing and the fix pipeline.

pub mod aggregator;
pub mod circuit_breaker;
pub mod context_truncation;
pub mod control_loop;
pub mod failure_extractor;
pub mod fix_stage;
pub mod matrix;
pub mod merge_stage;
pub mod oracle_calls;
pub mod partitioner;
pub mod shared_files;
pub mod stall_detector;
pub mod synthesis;
pub mod test_worker;
pub mod unfixable_filter;
pub mod worker_pool;

pub use aggregator::{aggregate_dir, AggregateReport};
pub use circuit_breaker::{run_command_once, run_guarded, CircuitBreaker, CircuitBreakerConfig, GuardOutcome};
pub use control_loop::{ControlLoop, LoopDependencies, LoopOutcome, LoopSettings, LoopSummary};
pub use failure_extractor::FailureExtractor;
pub use fix_stage::FixStage;
pub use matrix::build_matrix;
pub use merge_stage::MergeStage;
pub use partitioner::partition;
pub use shared_files::OwnershipMap;
pub use stall_detector::StallDetector;
pub use synthesis::SynthesisStage;
pub use test_worker::{TestWorker, WorkerSettings};
pub use unfixable_filter::UnfixableFilter;
pub use worker_pool::{InProcessLauncher, ProcessLauncher, WorkerLauncher, WorkerPool};
