//! The test → diagnose → fix → merge control loop.
//!
//! Each iteration runs the test matrix under its own run id, folds the
//! results into a ledger of latest status per pair, records a metrics point
//! and, unless the loop is done, diagnoses the remaining failures, fixes them
//! cluster by cluster and merges the shared-file changes. Every halt other
//! than convergence leaves an `escalation.json` in the loop directory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::adapters::oracles::OracleSet;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    iteration_run_id, ClusterMap, Config, FailureClusters, MetricsPoint, OverallStatus, RetestScope, ScenarioMode,
    StallVerdict, StatusCounts, TestInstance, TestPair, UnfixableItem,
};
use crate::domain::ports::{MetricsRepository, ResultRepository, RosterRepository, UnfixableRepository};
use crate::infrastructure::logging::SecretScrubber;
use crate::services::aggregator::AggregateReport;
use crate::services::circuit_breaker::{run_guarded, AttemptFailure, CircuitBreaker, CircuitBreakerConfig, GuardOutcome};
use crate::services::context_truncation::{PayloadTrimmer, TruncationConfig};
use crate::services::failure_extractor::FailureExtractor;
use crate::services::fix_stage::{FixStage, FixStageReport};
use crate::services::matrix::build_matrix;
use crate::services::merge_stage::{MergeConflict, MergeReport, MergeStage, PendingChanges};
use crate::services::shared_files::OwnershipMap;
use crate::services::stall_detector::StallDetector;
use crate::services::synthesis::{SynthesisPlan, SynthesisStage};
use crate::services::unfixable_filter::UnfixableFilter;
use crate::services::worker_pool::{WorkerLauncher, WorkerPool};

pub const ESCALATION_FILE: &str = "escalation.json";

/// How the loop ended. Only `Converged` is a success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// Every pair of the matrix passes.
    Converged { iteration: u32 },
    /// Metrics did not improve over the trailing window.
    ///
    /// Fixable clusters may still exist. Two more fix rounds on them made no
    /// difference, so they count as no longer fixable by the loop and it halts.
    Stalled { iteration: u32 },
    /// Synthesis kept failing with the same signature.
    CircuitOpen { iteration: u32, signature: String },
    /// Failures remain but none of them can be sent to a fix task.
    NoFixableCandidates { iteration: u32 },
    /// `max_iterations` ran without converging.
    IterationLimit { iteration: u32 },
}

impl LoopOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Converged { .. } => 0,
            Self::Stalled { .. } => 2,
            Self::CircuitOpen { .. } => 3,
            Self::NoFixableCandidates { .. } => 4,
            Self::IterationLimit { .. } => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converged { .. } => "converged",
            Self::Stalled { .. } => "stalled",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::NoFixableCandidates { .. } => "no_fixable_candidates",
            Self::IterationLimit { .. } => "iteration_limit",
        }
    }

    pub fn iteration(&self) -> u32 {
        match self {
            Self::Converged { iteration }
            | Self::Stalled { iteration }
            | Self::CircuitOpen { iteration, .. }
            | Self::NoFixableCandidates { iteration }
            | Self::IterationLimit { iteration } => *iteration,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }
}

/// Final state shown to the user and written as the escalation artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSummary {
    pub loop_id: String,
    #[serde(flatten)]
    pub outcome: LoopOutcome,
    pub counts: StatusCounts,
    /// Matrix pairs with no recorded result at all.
    pub missing_results: usize,
    pub unresolved_conflicts: Vec<MergeConflict>,
    /// Clusters the diagnosis oracle wants a human to look at.
    pub needs_human: BTreeSet<String>,
    pub unfixable_added: usize,
}

impl LoopSummary {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    /// Repeated failure signature when the circuit opened.
    pub fn signature(&self) -> Option<&str> {
        match &self.outcome {
            LoopOutcome::CircuitOpen { signature, .. } => Some(signature),
            _ => None,
        }
    }
}

/// Per-iteration artifact, `iteration-{n}.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: u32,
    pub run_id: String,
    pub tested_pairs: usize,
    pub workers: AggregateReport,
    /// Latest status of every matrix pair after this iteration.
    pub counts: StatusCounts,
    pub metrics: Option<MetricsPoint>,
    pub verdict: Option<StallVerdict>,
    /// Cluster → failures before blacklist filtering.
    pub clusters: BTreeMap<String, usize>,
    pub blacklisted_failures: usize,
    pub synthesis_attempts: u32,
    pub plan: Option<SynthesisPlan>,
    pub unfixable_added: usize,
    pub fix: Option<FixStageReport>,
    pub merge: Option<MergeReport>,
    pub halted: Option<LoopOutcome>,
}

/// Loop-level settings.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub loop_id: String,
    pub max_iterations: u32,
    pub retest: RetestScope,
    /// Parent of the per-loop directory.
    pub work_dir: PathBuf,
    pub breaker: CircuitBreakerConfig,
    pub fix_timeout: Duration,
    pub truncation: TruncationConfig,
}

impl LoopSettings {
    pub fn from_config(config: &Config, loop_id: impl Into<String>) -> Self {
        Self {
            loop_id: loop_id.into(),
            max_iterations: config.loop_config.max_iterations,
            retest: config.loop_config.retest,
            work_dir: PathBuf::from(&config.loop_config.work_dir),
            breaker: CircuitBreakerConfig::from(&config.circuit_breaker),
            fix_timeout: Duration::from_secs(config.fix.task_timeout_secs),
            truncation: TruncationConfig::from(&config.extraction),
        }
    }

    pub fn loop_dir(&self) -> PathBuf {
        self.work_dir.join(&self.loop_id)
    }
}

/// Stores and oracles the loop runs against.
#[derive(Clone)]
pub struct LoopDependencies {
    pub roster: Arc<dyn RosterRepository>,
    pub results: Arc<dyn ResultRepository>,
    pub unfixable: Arc<dyn UnfixableRepository>,
    pub metrics: Arc<dyn MetricsRepository>,
    pub oracles: OracleSet,
    pub launcher: Arc<dyn WorkerLauncher>,
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    status: OverallStatus,
    score: f64,
}

/// Score of one instance on a 0-100 scale.
///
/// Exploratory instances use their rubric mean; scripted instances the share
/// of passed steps. Errors score zero.
pub fn instance_score(instance: &TestInstance) -> f64 {
    if instance.status == OverallStatus::Error {
        return 0.0;
    }
    match (instance.key.mode, instance.score) {
        (ScenarioMode::Exploratory, Some(score)) => score,
        _ if instance.steps_total == 0 => 0.0,
        _ => 100.0 * f64::from(instance.steps_completed) / f64::from(instance.steps_total),
    }
}

pub struct ControlLoop {
    settings: LoopSettings,
    deps: LoopDependencies,
    pool: WorkerPool,
    clusters: ClusterMap,
    ownership: Arc<OwnershipMap>,
}

impl ControlLoop {
    pub fn new(
        settings: LoopSettings,
        deps: LoopDependencies,
        workers: usize,
        clusters: ClusterMap,
        ownership: OwnershipMap,
    ) -> Self {
        Self {
            pool: WorkerPool::new(deps.launcher.clone(), workers),
            settings,
            deps,
            clusters,
            ownership: Arc::new(ownership),
        }
    }

    /// Build the loop from the full configuration.
    pub fn from_config(config: &Config, loop_id: impl Into<String>, deps: LoopDependencies) -> Self {
        Self::new(
            LoopSettings::from_config(config, loop_id),
            deps,
            config.workers.count,
            ClusterMap::from_clusters(&config.clusters),
            OwnershipMap::from_config(&config.ownership),
        )
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// Run iterations until the loop converges or halts.
    pub async fn run(&self) -> DomainResult<LoopSummary> {
        let loop_id = self.settings.loop_id.clone();
        let loop_dir = self.settings.loop_dir();
        std::fs::create_dir_all(&loop_dir)?;

        let roster = self.deps.roster.load().await?;
        let matrix = build_matrix(&roster)?;
        if matrix.is_empty() {
            return Err(DomainError::ValidationFailed(
                "roster has no persona/scenario assignments".to_string(),
            ));
        }

        let scrubber = SecretScrubber::new()
            .with_known_secrets(roster.personas.iter().map(|p| p.credentials.password.clone()));
        let extractor = FailureExtractor::new(
            self.deps.results.clone(),
            self.clusters.clone(),
            PayloadTrimmer::new(self.settings.truncation.clone(), scrubber),
        );
        let filter = UnfixableFilter::new(self.deps.unfixable.clone());
        let stall = StallDetector::new(self.deps.metrics.clone());
        let synthesis = SynthesisStage::new(self.deps.oracles.diagnosis.clone());
        let fix = FixStage::new(
            self.deps.oracles.fix.clone(),
            self.ownership.clone(),
            self.settings.fix_timeout,
        );
        let merge = MergeStage::new(
            self.ownership.clone(),
            self.deps.oracles.merge.clone(),
            PendingChanges::in_dir(&loop_dir),
        );

        let mut ledger: HashMap<TestPair, LedgerEntry> = HashMap::new();
        let mut summary = LoopSummary {
            loop_id: loop_id.clone(),
            outcome: LoopOutcome::IterationLimit {
                iteration: self.settings.max_iterations,
            },
            counts: StatusCounts::default(),
            missing_results: matrix.len(),
            unresolved_conflicts: Vec::new(),
            needs_human: BTreeSet::new(),
            unfixable_added: 0,
        };

        tracing::info!(loop_id = %loop_id, pairs = matrix.len(), "Starting control loop");

        for iteration in 1..=self.settings.max_iterations.max(1) {
            let run_id = iteration_run_id(&loop_id, iteration);
            let span = tracing::info_span!("iteration", loop_id = %loop_id, iteration, run_id = %run_id);
            let mut report = IterationReport {
                iteration,
                run_id: run_id.clone(),
                ..Default::default()
            };

            let halted: DomainResult<Option<LoopOutcome>> = async {
                // Test.
                let pairs: Vec<TestPair> = match (iteration, self.settings.retest) {
                    (1, _) | (_, RetestScope::Full) => matrix.clone(),
                    (_, RetestScope::FailingOnly) => matrix
                        .iter()
                        .filter(|p| ledger.get(*p).map_or(true, |e| !e.status.is_pass()))
                        .cloned()
                        .collect(),
                };
                report.tested_pairs = pairs.len();
                report.workers = self.pool.run(&run_id, &pairs, &loop_dir.join(&run_id)).await?;

                for instance in self.deps.results.list_by_run(&run_id).await? {
                    ledger.insert(
                        instance.key.pair(),
                        LedgerEntry {
                            status: instance.status,
                            score: instance_score(&instance),
                        },
                    );
                }
                let counts: StatusCounts = matrix
                    .iter()
                    .filter_map(|p| ledger.get(p).map(|e| e.status))
                    .collect();
                let score_sum: f64 = matrix.iter().filter_map(|p| ledger.get(p)).map(|e| e.score).sum();
                report.counts = counts;
                summary.counts = counts;
                summary.missing_results = matrix.len() - counts.total() as usize;

                // Measure.
                let point = MetricsPoint::new(iteration, counts.pass as u32, score_sum / matrix.len() as f64);
                let verdict = stall.record(&loop_id, point).await?;
                report.metrics = Some(point);
                report.verdict = Some(verdict);

                if counts.pass as usize == matrix.len() {
                    return Ok(Some(LoopOutcome::Converged { iteration }));
                }

                // Extract and filter.
                let clusters = extractor.extract(&run_id).await?;
                report.clusters = clusters.iter().map(|(k, v)| (k.clone(), v.len())).collect();
                let filtered = filter.apply(clusters).await?;
                report.blacklisted_failures = filtered.removed;

                if filtered.clusters.is_empty() {
                    return Ok(Some(LoopOutcome::NoFixableCandidates { iteration }));
                }
                if verdict.is_stalled() {
                    return Ok(Some(LoopOutcome::Stalled { iteration }));
                }
                if iteration >= self.settings.max_iterations {
                    return Ok(Some(LoopOutcome::IterationLimit { iteration }));
                }

                // Diagnose.
                let mut breaker = CircuitBreaker::new(self.settings.breaker.clone());
                let guarded = run_guarded(&mut breaker, |_| {
                    let synthesis = &synthesis;
                    let clusters = &filtered.clusters;
                    let run_id = &run_id;
                    async move {
                        synthesis
                            .synthesize(run_id, iteration, clusters)
                            .await
                            .map_err(|e| AttemptFailure::new(e.classification(), e.to_string()))
                    }
                })
                .await;
                report.synthesis_attempts = guarded.attempts();

                let response = match guarded {
                    GuardOutcome::Succeeded { value, .. } => value,
                    GuardOutcome::CircuitOpen { signature, .. } => {
                        return Ok(Some(LoopOutcome::CircuitOpen { iteration, signature }));
                    }
                    GuardOutcome::AttemptsExhausted { attempts, last_failure } => {
                        return Err(DomainError::SynthesisFailed(format!(
                            "gave up after {attempts} attempts: {}",
                            last_failure.output
                        )));
                    }
                };
                let plan = SynthesisPlan::from_response(response, &filtered.clusters);

                let added = self.blacklist(&plan, &filtered.clusters).await?;
                report.unfixable_added = added;
                summary.unfixable_added += added;
                summary
                    .needs_human
                    .extend(plan.needs_human.iter().map(|s| s.cluster.clone()));

                if plan.fixable.is_empty() {
                    report.plan = Some(plan);
                    if added > 0 {
                        return Ok(None);
                    }
                    return Ok(Some(LoopOutcome::NoFixableCandidates { iteration }));
                }

                // Fix, then merge.
                let fix_report = fix.run(plan.fixable.clone()).await?;
                let merge_report = merge.run(&fix_report.results).await?;
                summary.unresolved_conflicts = merge_report.unresolved_conflicts();

                report.plan = Some(plan);
                report.fix = Some(fix_report);
                report.merge = Some(merge_report);
                Ok::<_, DomainError>(None)
            }
            .instrument(span)
            .await;
            let halted = halted?;

            report.halted = halted.clone();
            write_json(&loop_dir.join(format!("iteration-{iteration}.json")), &report)?;

            if let Some(outcome) = halted {
                summary.outcome = outcome;
                break;
            }
        }

        tracing::info!(
            loop_id = %loop_id,
            outcome = summary.outcome.as_str(),
            iteration = summary.outcome.iteration(),
            pass = summary.counts.pass,
            fail = summary.counts.fail,
            partial = summary.counts.partial,
            error = summary.counts.error,
            "Control loop finished"
        );

        if !summary.outcome.is_converged() {
            write_json(&loop_dir.join(ESCALATION_FILE), &summary)?;
        }
        Ok(summary)
    }

    /// Blacklist every failure of the clusters diagnosed as unfixable.
    async fn blacklist(&self, plan: &SynthesisPlan, clusters: &FailureClusters) -> DomainResult<usize> {
        let mut added = 0;
        for spec in &plan.unfixable {
            let reason = if spec.diagnosis.is_empty() {
                format!("cluster {} diagnosed as unfixable", spec.cluster)
            } else {
                spec.diagnosis.clone()
            };
            let mut seen = BTreeSet::new();
            for failure in clusters.get(&spec.cluster).into_iter().flatten() {
                if !seen.insert((failure.scenario_id.as_str(), failure.mode)) {
                    continue;
                }
                let item = UnfixableItem::new(&failure.scenario_id, failure.mode, &reason);
                if self.deps.unfixable.append(&item).await? {
                    tracing::info!(cluster = %spec.cluster, scenario_id = %failure.scenario_id, "Blacklisted scenario");
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> DomainResult<()> {
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}
