//! Worker pool: partitions a run into batches and launches one worker per batch.
//!
//! Workers report through `worker-{index}.json` files in the run directory,
//! whichever launcher started them. A worker that dies before writing its
//! file simply counts as missing output in the aggregate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{TestPair, WorkerOutcome};
use crate::domain::ports::{Oracle, ResultRepository, RosterRepository};
use crate::services::aggregator::{aggregate_dir, AggregateReport};
use crate::services::partitioner::partition;
use crate::services::test_worker::{TestWorker, WorkerSettings};

/// Everything one worker needs to run its batch.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub index: usize,
    pub run_id: String,
    pub batch: Vec<TestPair>,
    /// Directory the outcome file goes to.
    pub out_dir: PathBuf,
}

/// Starts a worker and waits for it to finish.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, spec: WorkerSpec) -> DomainResult<()>;
}

/// Write `outcome` to its file in `dir`.
pub fn write_outcome(dir: &Path, outcome: &WorkerOutcome) -> DomainResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(WorkerOutcome::file_name(outcome.worker_index));
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(outcome)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}

/// Batch file name for a worker index.
pub fn batch_file_name(index: usize) -> String {
    format!("batch-{index}.json")
}

/// Launches each worker as a `fixloop worker` child process.
pub struct ProcessLauncher {
    program: PathBuf,
    config_path: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_path: None,
        }
    }

    /// Launcher re-invoking the running executable.
    pub fn current_exe() -> DomainResult<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn with_config(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, spec: WorkerSpec) -> DomainResult<()> {
        std::fs::create_dir_all(&spec.out_dir)?;
        let batch_path = spec.out_dir.join(batch_file_name(spec.index));
        std::fs::write(&batch_path, serde_json::to_vec(&spec.batch)?)?;

        let mut cmd = Command::new(&self.program);
        if let Some(config) = &self.config_path {
            cmd.arg("--config").arg(config);
        }
        cmd.arg("worker")
            .arg("--run-id")
            .arg(&spec.run_id)
            .arg("--index")
            .arg(spec.index.to_string())
            .arg("--batch-file")
            .arg(&batch_path)
            .arg("--out-dir")
            .arg(&spec.out_dir)
            .kill_on_drop(true);

        let status = cmd
            .status()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("failed to spawn worker {}: {e}", spec.index)))?;

        if status.success() {
            Ok(())
        } else {
            Err(DomainError::ExecutionFailed(format!(
                "worker {} exited with {status}",
                spec.index
            )))
        }
    }
}

/// Runs each worker as a tokio task inside this process.
pub struct InProcessLauncher {
    oracle: Arc<dyn Oracle>,
    results: Arc<dyn ResultRepository>,
    roster: Arc<dyn RosterRepository>,
    settings: WorkerSettings,
}

impl InProcessLauncher {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        results: Arc<dyn ResultRepository>,
        roster: Arc<dyn RosterRepository>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            oracle,
            results,
            roster,
            settings,
        }
    }
}

#[async_trait]
impl WorkerLauncher for InProcessLauncher {
    async fn launch(&self, spec: WorkerSpec) -> DomainResult<()> {
        let worker = TestWorker::new(
            spec.index,
            spec.run_id,
            self.oracle.clone(),
            self.results.clone(),
            self.roster.clone(),
            self.settings.clone(),
        );
        let out_dir = spec.out_dir;
        let batch = spec.batch;

        let handle = tokio::spawn(async move {
            let outcome = worker.run_batch(&batch).await?;
            write_outcome(&out_dir, &outcome)
        });

        match handle.await {
            Ok(result) => result.map(|_| ()),
            Err(e) => Err(DomainError::ExecutionFailed(format!("worker task failed: {e}"))),
        }
    }
}

/// Fans a run out over `workers` launched workers and aggregates their files.
pub struct WorkerPool {
    launcher: Arc<dyn WorkerLauncher>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, workers: usize) -> Self {
        Self { launcher, workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `pairs` under `run_id`, outcome files going to `run_dir`.
    pub async fn run(&self, run_id: &str, pairs: &[TestPair], run_dir: &Path) -> DomainResult<AggregateReport> {
        let batches = partition(pairs, self.workers)?;
        std::fs::create_dir_all(run_dir)?;

        // Stale files from an interrupted earlier attempt would be double counted.
        for index in 0..self.workers {
            let stale = run_dir.join(WorkerOutcome::file_name(index));
            if stale.exists() {
                std::fs::remove_file(&stale)?;
            }
        }

        tracing::info!(run_id, pairs = pairs.len(), workers = self.workers, "Launching workers");

        let launches = batches.into_iter().enumerate().map(|(index, batch)| {
            let launcher = self.launcher.clone();
            let spec = WorkerSpec {
                index,
                run_id: run_id.to_string(),
                batch,
                out_dir: run_dir.to_path_buf(),
            };
            async move { (index, launcher.launch(spec).await) }
        });

        for (index, result) in join_all(launches).await {
            if let Err(e) = result {
                tracing::error!(run_id, worker = index, error = %e, "Worker did not finish cleanly");
            }
        }

        Ok(aggregate_dir(run_dir, self.workers))
    }
}
