//! Roster command handlers.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::Cell;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::cli::context::AppContext;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::{Roster, ScenarioMode};

#[derive(Subcommand, Debug)]
pub enum RosterCommands {
    /// Import personas and scenarios from a YAML file
    Import {
        /// Roster YAML file
        file: PathBuf,
    },

    /// List personas with their assigned scenarios
    List,
}

#[derive(Debug, serde::Serialize)]
pub struct ImportOutput {
    pub file: PathBuf,
    pub personas: usize,
    pub scenarios: usize,
    pub pairs: usize,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        format!(
            "Imported {} persona(s) and {} scenario(s) from {} ({} test pairs)",
            self.personas,
            self.scenarios,
            self.file.display(),
            self.pairs
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RosterRow {
    pub persona_id: String,
    pub username: String,
    pub scenarios: Vec<(String, ScenarioMode)>,
}

#[derive(Debug, serde::Serialize)]
pub struct ListOutput {
    pub personas: Vec<RosterRow>,
}

impl CommandOutput for ListOutput {
    fn to_human(&self) -> String {
        if self.personas.is_empty() {
            return "No personas found. Import a roster with `fixloop roster import <file>`.".to_string();
        }
        let mut t = table(["Persona", "Username", "Scenarios"]);
        for row in &self.personas {
            let scenarios: Vec<String> = row
                .scenarios
                .iter()
                .map(|(id, mode)| format!("{id} ({mode})"))
                .collect();
            t.add_row(vec![
                Cell::new(&row.persona_id),
                Cell::new(&row.username),
                Cell::new(scenarios.join("\n")),
            ]);
        }
        t.to_string()
    }
}

pub async fn execute(command: RosterCommands, ctx: &AppContext, json_mode: bool) -> Result<()> {
    match command {
        RosterCommands::Import { file } => handle_import(ctx, file, json_mode).await,
        RosterCommands::List => handle_list(ctx, json_mode).await,
    }
}

async fn handle_import(ctx: &AppContext, file: PathBuf, json_mode: bool) -> Result<()> {
    let roster = Roster::from_yaml_file(&file).with_context(|| format!("Failed to read roster {}", file.display()))?;
    ctx.roster.import(&roster).await.context("Failed to import roster")?;

    let pairs = roster.personas.iter().map(|p| p.scenario_ids.len()).sum();
    output(
        &ImportOutput {
            file,
            personas: roster.personas.len(),
            scenarios: roster.scenarios.len(),
            pairs,
        },
        json_mode,
    );
    Ok(())
}

async fn handle_list(ctx: &AppContext, json_mode: bool) -> Result<()> {
    let roster = ctx.roster.load().await.context("Failed to load roster")?;
    let modes: HashMap<&str, ScenarioMode> = roster.scenarios.iter().map(|s| (s.id.as_str(), s.mode)).collect();

    let personas = roster
        .personas
        .iter()
        .map(|p| RosterRow {
            persona_id: p.id.clone(),
            username: p.credentials.username.clone(),
            scenarios: p
                .scenario_ids
                .iter()
                .filter_map(|id| modes.get(id.as_str()).map(|mode| (id.clone(), *mode)))
                .collect(),
        })
        .collect();

    output(&ListOutput { personas }, json_mode);
    Ok(())
}
