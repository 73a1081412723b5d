//! Unfixable blacklist command handlers.
//!
//! The blacklist is append-only; entries are never removed.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::Cell;

use crate::cli::context::AppContext;
use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{ScenarioMode, UnfixableItem};

#[derive(Subcommand, Debug)]
pub enum UnfixableCommands {
    /// Exclude a (scenario, mode) from fixing
    Add {
        scenario_id: String,

        /// scripted or exploratory
        #[arg(short, long, value_parser = parse_mode, default_value = "scripted")]
        mode: ScenarioMode,

        /// Why the failure cannot be fixed by the loop
        #[arg(short, long)]
        reason: String,
    },

    /// List blacklisted scenarios
    List,
}

fn parse_mode(s: &str) -> Result<ScenarioMode, String> {
    ScenarioMode::from_str(s).ok_or_else(|| format!("unknown mode '{s}', expected scripted or exploratory"))
}

#[derive(Debug, serde::Serialize)]
pub struct AddOutput {
    pub item: UnfixableItem,
    pub added: bool,
}

impl CommandOutput for AddOutput {
    fn to_human(&self) -> String {
        if self.added {
            format!("Blacklisted {} ({})", self.item.scenario_id, self.item.mode)
        } else {
            format!("{} ({}) was already blacklisted", self.item.scenario_id, self.item.mode)
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ListOutput {
    pub items: Vec<UnfixableItem>,
}

impl CommandOutput for ListOutput {
    fn to_human(&self) -> String {
        if self.items.is_empty() {
            return "No unfixable scenarios.".to_string();
        }
        let mut t = table(["Scenario", "Mode", "Reason", "Recorded"]);
        for item in &self.items {
            t.add_row(vec![
                Cell::new(&item.scenario_id),
                Cell::new(item.mode.as_str()),
                Cell::new(truncate(&item.reason, 60)),
                Cell::new(item.recorded_at.format("%Y-%m-%d %H:%M")),
            ]);
        }
        t.to_string()
    }
}

pub async fn execute(command: UnfixableCommands, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match command {
        UnfixableCommands::Add {
            scenario_id,
            mode,
            reason,
        } => {
            let item = UnfixableItem::new(scenario_id, mode, reason);
            let added = ctx.unfixable.append(&item).await.context("Failed to record unfixable item")?;
            output(&AddOutput { item, added }, json_mode);
        }
        UnfixableCommands::List => {
            let items = ctx.unfixable.list().await.context("Failed to list unfixable items")?;
            output(&ListOutput { items }, json_mode);
        }
    }
    Ok(())
}
