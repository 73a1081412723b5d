//! Implementation of the hidden `fixloop worker` command.
//!
//! One worker process: runs its batch against the test oracle, then writes
//! `worker-{index}.json` into the run directory.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::adapters::oracles::OracleRegistry;
use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, TestPair, WorkerOutcome};
use crate::services::test_worker::{TestWorker, WorkerSettings};
use crate::services::worker_pool::write_outcome;

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    pub run_id: String,

    /// Worker index within the run
    #[arg(long)]
    pub index: usize,

    /// JSON array of pairs to run
    #[arg(long)]
    pub batch_file: PathBuf,

    /// Directory the outcome file is written to
    #[arg(long)]
    pub out_dir: PathBuf,
}

#[derive(Debug, serde::Serialize)]
pub struct WorkerOutput {
    #[serde(flatten)]
    pub outcome: WorkerOutcome,
    pub outcome_file: PathBuf,
}

impl CommandOutput for WorkerOutput {
    fn to_human(&self) -> String {
        let c = &self.outcome.counts;
        format!(
            "Worker {} ({}): executed {}, reused {}; pass {} fail {} partial {} error {}; wrote {}",
            self.outcome.worker_index,
            self.outcome.run_id,
            self.outcome.executed,
            self.outcome.reused,
            c.pass,
            c.fail,
            c.partial,
            c.error,
            self.outcome_file.display()
        )
    }
}

pub fn read_batch(path: &Path) -> Result<Vec<TestPair>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read batch file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid batch file {}", path.display()))
}

pub async fn execute(args: WorkerArgs, config: Config, json_mode: bool) -> Result<()> {
    let batch = read_batch(&args.batch_file)?;
    let ctx = AppContext::open(config).await?;

    let oracle = OracleRegistry::new(ctx.config.rate_limit.clone())
        .create_test_oracle(&ctx.config.oracles)
        .context("Failed to set up the test oracle")?;

    let worker = TestWorker::new(
        args.index,
        args.run_id.clone(),
        oracle,
        ctx.results.clone(),
        ctx.roster.clone(),
        WorkerSettings::from(&ctx.config.workers),
    );
    let outcome = worker.run_batch(&batch).await.context("Worker batch failed")?;
    let outcome_file = write_outcome(&args.out_dir, &outcome).context("Failed to write worker outcome")?;

    output(&WorkerOutput { outcome, outcome_file }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ScenarioMode;
    use tempfile::TempDir;

    #[test]
    fn test_read_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch-0.json");
        let pairs = vec![TestPair::new("owner", "checkout", ScenarioMode::Scripted)];
        std::fs::write(&path, serde_json::to_vec(&pairs).unwrap()).unwrap();

        assert_eq!(read_batch(&path).unwrap(), pairs);
    }

    #[test]
    fn test_read_batch_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch-0.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(read_batch(&path).is_err());
    }
}
