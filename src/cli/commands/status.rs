//! Implementation of the `fixloop status` command.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;

use crate::cli::context::AppContext;
use crate::cli::output::{output, status_cell, table, truncate, CommandOutput};
use crate::domain::models::{OverallStatus, StatusCounts, TestInstance};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Run id, e.g. `nightly-it03`; lists recent runs when omitted
    pub run_id: Option<String>,

    /// Also list every non-passing instance
    #[arg(long)]
    pub failures: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct StatusOutput {
    pub run_id: String,
    pub counts: StatusCounts,
    pub total: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TestInstance>,
}

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        if self.total == 0 {
            return format!("No results recorded for run {}", self.run_id);
        }
        let mut t = table(["Status", "Count"]);
        for (status, count) in [
            (OverallStatus::Pass, self.counts.pass),
            (OverallStatus::Partial, self.counts.partial),
            (OverallStatus::Fail, self.counts.fail),
            (OverallStatus::Error, self.counts.error),
        ] {
            t.add_row(vec![status_cell(status), Cell::new(count)]);
        }
        let mut lines = vec![format!("Run {} ({} instances)", self.run_id, self.total), t.to_string()];

        if !self.failures.is_empty() {
            let mut f = table(["Persona", "Scenario", "Mode", "Status", "Steps", "Error"]);
            for inst in &self.failures {
                f.add_row(vec![
                    Cell::new(&inst.key.persona_id),
                    Cell::new(&inst.key.scenario_id),
                    Cell::new(inst.key.mode.as_str()),
                    status_cell(inst.status),
                    Cell::new(format!("{}/{}", inst.steps_completed, inst.steps_total)),
                    Cell::new(truncate(inst.error_message.as_deref().unwrap_or("-"), 50)),
                ]);
            }
            lines.push(f.to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunsOutput {
    pub runs: Vec<String>,
}

impl CommandOutput for RunsOutput {
    fn to_human(&self) -> String {
        if self.runs.is_empty() {
            return "No runs recorded yet.".to_string();
        }
        let mut lines = vec!["Recent runs:".to_string()];
        lines.extend(self.runs.iter().map(|r| format!("  {r}")));
        lines.join("\n")
    }
}

pub async fn execute(args: StatusArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let Some(run_id) = args.run_id else {
        let runs = ctx.results.list_runs(20).await.context("Failed to list runs")?;
        output(&RunsOutput { runs }, json_mode);
        return Ok(());
    };

    let mut counts = StatusCounts::default();
    for row in ctx.results.count_by_status(&run_id).await.context("Failed to count results")? {
        counts.add(row.status, row.count);
    }
    let failures = if args.failures {
        ctx.results.list_failures(&run_id).await.context("Failed to list failures")?
    } else {
        Vec::new()
    };

    output(
        &StatusOutput {
            total: counts.total(),
            run_id,
            counts,
            failures,
        },
        json_mode,
    );
    Ok(())
}
