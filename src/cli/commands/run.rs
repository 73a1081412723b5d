//! Implementation of the `fixloop run` command.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use comfy_table::Cell;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::oracles::OracleRegistry;
use crate::cli::context::AppContext;
use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{Config, LauncherKind, Roster};
use crate::infrastructure::config::ConfigLoader;
use crate::services::control_loop::{ControlLoop, LoopDependencies, LoopSummary};
use crate::services::test_worker::WorkerSettings;
use crate::services::worker_pool::{InProcessLauncher, ProcessLauncher, WorkerLauncher};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Loop id; re-using an id resumes that loop
    #[arg(long)]
    pub loop_id: Option<String>,

    /// Override loop.max_iterations
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Override workers.count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Run workers as tasks in this process instead of child processes
    #[arg(long)]
    pub in_process: bool,

    /// Roster file to import before the first iteration (defaults to roster_path)
    #[arg(long)]
    pub roster: Option<PathBuf>,
}

impl RunArgs {
    /// Apply command-line overrides and re-validate.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(max) = self.max_iterations {
            config.loop_config.max_iterations = max;
        }
        if let Some(workers) = self.workers {
            config.workers.count = workers;
        }
        if self.in_process {
            config.workers.launcher = LauncherKind::InProcess;
        }
        ConfigLoader::validate(config)?;
        Ok(())
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    #[serde(flatten)]
    pub summary: LoopSummary,
    pub exit_code: i32,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let s = &self.summary;
        let headline = format!(
            "Loop {} finished: {} at iteration {}",
            s.loop_id,
            s.outcome.as_str(),
            s.outcome.iteration()
        );
        let headline = if s.outcome.is_converged() {
            console::style(headline).green().bold().to_string()
        } else {
            console::style(headline).yellow().bold().to_string()
        };

        let mut lines = vec![headline];
        lines.push(format!(
            "pass {}  fail {}  partial {}  error {}  missing {}",
            s.counts.pass, s.counts.fail, s.counts.partial, s.counts.error, s.missing_results
        ));
        if let Some(signature) = s.signature() {
            lines.push(format!("Repeated failure signature: {signature}"));
        }
        if !s.needs_human.is_empty() {
            let clusters: Vec<&str> = s.needs_human.iter().map(String::as_str).collect();
            lines.push(format!("Needs a human: {}", clusters.join(", ")));
        }
        if s.unfixable_added > 0 {
            lines.push(format!("Blacklisted {} scenario(s) as unfixable", s.unfixable_added));
        }
        if !s.unresolved_conflicts.is_empty() {
            let mut t = table(["File", "Location", "Clusters"]);
            for conflict in &s.unresolved_conflicts {
                let clusters: Vec<String> = conflict
                    .candidates
                    .iter()
                    .flat_map(|c| c.origin_clusters.iter().cloned())
                    .collect();
                t.add_row(vec![
                    Cell::new(&conflict.file),
                    Cell::new(truncate(&conflict.location, 40)),
                    Cell::new(clusters.join(", ")),
                ]);
            }
            lines.push("\nUnresolved merge conflicts:".to_string());
            lines.push(t.to_string());
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, mut config: Config, config_path: Option<PathBuf>, json_mode: bool) -> Result<i32> {
    args.apply(&mut config)?;
    let ctx = AppContext::open(config).await?;
    let config = &ctx.config;

    let roster_path = args.roster.clone().or_else(|| config.roster_path.as_ref().map(PathBuf::from));
    if let Some(path) = roster_path {
        let roster = Roster::from_yaml_file(&path)
            .with_context(|| format!("Failed to read roster {}", path.display()))?;
        ctx.roster.import(&roster).await.context("Failed to import roster")?;
        tracing::info!(
            path = %path.display(),
            personas = roster.personas.len(),
            scenarios = roster.scenarios.len(),
            "Imported roster"
        );
    }

    let oracles = OracleRegistry::new(config.rate_limit.clone())
        .create_set(&config.oracles)
        .context("Failed to set up oracles")?;

    let launcher: Arc<dyn WorkerLauncher> = match config.workers.launcher {
        LauncherKind::InProcess => Arc::new(InProcessLauncher::new(
            oracles.test.clone(),
            ctx.results.clone(),
            ctx.roster.clone(),
            WorkerSettings::from(&config.workers),
        )),
        LauncherKind::Process => Arc::new(ProcessLauncher::current_exe()?.with_config(config_path)),
    };

    let loop_id = args
        .loop_id
        .clone()
        .unwrap_or_else(|| format!("loop-{}", Utc::now().format("%Y%m%d-%H%M%S")));

    let deps = LoopDependencies {
        roster: ctx.roster.clone(),
        results: ctx.results.clone(),
        unfixable: ctx.unfixable.clone(),
        metrics: ctx.metrics.clone(),
        oracles,
        launcher,
    };
    let control = ControlLoop::from_config(config, loop_id, deps);
    let summary = control.run().await.context("Control loop failed")?;

    let exit_code = summary.exit_code();
    output(&RunOutput { summary, exit_code }, json_mode);
    Ok(exit_code)
}
