//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::env;

use crate::domain::models::OverallStatus;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Table with the shared look: UTF-8 borders, bold header, dynamic width.
pub fn table<I, S>(header: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .into_iter()
                .map(|h| Cell::new(h.into()).add_attribute(Attribute::Bold)),
        );
    table
}

pub fn status_cell(status: OverallStatus) -> Cell {
    if supports_color() {
        Cell::new(status.as_str()).fg(status_color(status))
    } else {
        Cell::new(status.as_str())
    }
}

fn status_color(status: OverallStatus) -> Color {
    match status {
        OverallStatus::Pass => Color::Green,
        OverallStatus::Partial => Color::Yellow,
        OverallStatus::Fail => Color::Red,
        OverallStatus::Error => Color::Magenta,
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}
