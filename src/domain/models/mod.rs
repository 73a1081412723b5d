pub mod cluster;
pub mod config;
pub mod failure;
pub mod fix;
pub mod metrics;
pub mod oracle;
pub mod outcome;
pub mod roster;
pub mod test_instance;

pub use cluster::{ClusterMap, UNKNOWN_CLUSTER};
pub use config::{
    CircuitBreakerSettings, Config, DatabaseConfig, ExtractionConfig, FixConfig, LauncherKind,
    LoggingConfig, LoopConfig, OracleBackend, OracleConfig, OraclesConfig, OwnershipConfig,
    RateLimitConfig, RetestScope, WorkerConfig,
};
pub use failure::{failure_count, FailureClusters, FailureRecord, UnfixableItem};
pub use fix::{
    AppliedFix, ChangeDescriptor, ChangeKind, FixResult, FixSpec, SkippedFix, TaggedChange,
};
pub use metrics::{MetricsPoint, StallVerdict};
pub use oracle::{
    DiagnosisRequest, DiagnosisResponse, ExploratoryResponse, FixOracleRequest,
    FixOracleResponse, MergeOracleRequest, MergeOracleResponse, OracleKind, ScriptedResponse,
    TestOracleRequest,
};
pub use outcome::{StatusCounts, WorkerOutcome};
pub use roster::{Credentials, Persona, Roster, Scenario, ScenarioMode, ScenarioStep, TestPair};
pub use test_instance::{
    iteration_run_id, ExploratoryStepDetail, InstanceKey, OverallStatus, ScriptedStepDetail,
    StepDetail, StepStatus, TestInstance,
};
