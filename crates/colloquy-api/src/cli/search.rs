//! Search-augmented variant commands.

use anyhow::{Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use crate::state::AppState;

#[derive(Subcommand)]
pub enum SearchCommand {
    /// List the configured variants and mark the active one.
    #[command(alias = "ls")]
    List,
}

pub async fn handle_search_command(cmd: SearchCommand, state: &AppState, json: bool) -> Result<()> {
    let Some(search) = state.search.as_deref() else {
        bail!("the search backend is not configured (check backends.search and its API key)");
    };

    match cmd {
        SearchCommand::List => {
            let current = search.current_model();

            if json {
                let body = serde_json::json!({
                    "current": current,
                    "available": search.variants(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(presets::UTF8_FULL_CONDENSED);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                Cell::new("").fg(Color::White),
                Cell::new("Variant").fg(Color::White),
                Cell::new("Model").fg(Color::White),
                Cell::new("Lightweight").fg(Color::White),
            ]);
            for variant in search.variants() {
                let marker = if variant.name == current.name {
                    Cell::new("*").fg(Color::Green)
                } else {
                    Cell::new("")
                };
                table.add_row(vec![
                    marker,
                    Cell::new(&variant.name).fg(Color::Cyan),
                    Cell::new(&variant.model).fg(Color::White),
                    Cell::new(if variant.lightweight { "yes" } else { "no" }).fg(Color::DarkGrey),
                ]);
            }

            println!();
            println!("{table}");
            println!(
                "  {}",
                style("Switch at runtime with PUT /api/v1/backends/search/model").dim()
            );
            println!();
            Ok(())
        }
    }
}
