//! Implementation of the `fixloop metrics` command.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::Cell;

use crate::cli::context::AppContext;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{MetricsPoint, StallVerdict};
use crate::services::stall_detector::evaluate;

#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Loop id; lists known loops when omitted
    pub loop_id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct MetricsOutput {
    pub loop_id: String,
    pub history: Vec<MetricsPoint>,
    pub verdict: StallVerdict,
}

impl CommandOutput for MetricsOutput {
    fn to_human(&self) -> String {
        if self.history.is_empty() {
            return format!("No metrics recorded for loop {}", self.loop_id);
        }
        let mut t = table(["Iteration", "Passing", "Avg score"]);
        for point in &self.history {
            t.add_row(vec![
                Cell::new(point.iteration),
                Cell::new(point.pass_count),
                Cell::new(format!("{:.1}", point.avg_score)),
            ]);
        }
        format!("Loop {}\n{}\nVerdict: {}", self.loop_id, t, self.verdict.as_str())
    }
}

#[derive(Debug, serde::Serialize)]
pub struct LoopsOutput {
    pub loops: Vec<String>,
}

impl CommandOutput for LoopsOutput {
    fn to_human(&self) -> String {
        if self.loops.is_empty() {
            return "No loops recorded yet.".to_string();
        }
        let mut lines = vec!["Loops:".to_string()];
        lines.extend(self.loops.iter().map(|l| format!("  {l}")));
        lines.join("\n")
    }
}

pub async fn execute(args: MetricsArgs, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let Some(loop_id) = args.loop_id else {
        let loops = ctx.metrics.list_loops().await.context("Failed to list loops")?;
        output(&LoopsOutput { loops }, json_mode);
        return Ok(());
    };

    let history = ctx.metrics.history(&loop_id).await.context("Failed to load metrics history")?;
    let verdict = evaluate(&history);
    output(
        &MetricsOutput {
            loop_id,
            history,
            verdict,
        },
        json_mode,
    );
    Ok(())
}
