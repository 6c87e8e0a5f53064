//! Backend health command.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use colloquy_types::llm::ConnectionStatus;

use crate::state::AppState;

/// Probe every configured backend and print one row per backend.
pub async fn health(state: &AppState, json: bool) -> Result<()> {
    let report = state.gateway().health().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_empty() {
        println!();
        println!(
            "  {} No backends configured. Set an API key or enable {} in config.toml.",
            style("i").blue().bold(),
            style("backends.local").cyan()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("  {}", style("Backend Health").bold());
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Priority").fg(Color::White),
        Cell::new("Service").fg(Color::White),
        Cell::new("Connection").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Detail").fg(Color::White),
    ]);

    for (index, entry) in report.iter().enumerate() {
        let connection = match entry.connection {
            ConnectionStatus::Connected => Cell::new("connected").fg(Color::Green),
            ConnectionStatus::Disconnected => Cell::new("disconnected").fg(Color::Red),
            ConnectionStatus::Error => Cell::new("error").fg(Color::Yellow),
        };
        table.add_row(vec![
            Cell::new(index + 1).fg(Color::Cyan),
            Cell::new(&entry.service).fg(Color::White),
            connection,
            Cell::new(entry.model.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
            Cell::new(entry.detail.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();
    let connected = report
        .iter()
        .filter(|e| e.connection == ConnectionStatus::Connected)
        .count();
    println!(
        "  {}/{} backends connected",
        style(connected).bold(),
        report.len()
    );
    println!();

    Ok(())
}
