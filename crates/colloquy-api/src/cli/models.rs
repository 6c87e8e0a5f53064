//! Local runtime model lifecycle commands: list, pull, delete, bench.

use anyhow::{Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use colloquy_infra::llm::local::LocalRuntimeBackend;

use crate::state::AppState;

/// Model lifecycle subcommands.
#[derive(Subcommand)]
pub enum ModelsCommand {
    /// List installed models.
    #[command(alias = "ls")]
    List,

    /// Download a model into the runtime.
    Pull {
        /// Model name (e.g., llama3.2).
        name: String,
    },

    /// Remove an installed model.
    #[command(alias = "rm")]
    Delete {
        /// Model name to remove.
        name: String,
    },

    /// Time a short generation against a model.
    Bench {
        /// Model to benchmark; defaults to the configured local model.
        name: Option<String>,
    },
}

/// Handle a model lifecycle subcommand.
pub async fn handle_models_command(cmd: ModelsCommand, state: &AppState, json: bool) -> Result<()> {
    let Some(local) = state.local.as_deref() else {
        bail!("the local runtime backend is disabled (set backends.local.enabled = true)");
    };

    match cmd {
        ModelsCommand::List => list_models(local, json).await,
        ModelsCommand::Pull { name } => pull_model(local, &name, json).await,
        ModelsCommand::Delete { name } => delete_model(local, &name, json).await,
        ModelsCommand::Bench { name } => {
            let model = name.unwrap_or_else(|| state.config.backends.local.default_model.clone());
            bench_model(local, &model, json).await
        }
    }
}

async fn list_models(local: &LocalRuntimeBackend, json: bool) -> Result<()> {
    let models = local.list_models().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!();
        println!(
            "  {} No models installed. Use {} to download one.",
            style("i").blue().bold(),
            style("colloquy models pull <name>").cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Model").fg(Color::White),
        Cell::new("Size").fg(Color::White),
        Cell::new("Modified").fg(Color::White),
    ]);

    for model in &models {
        table.add_row(vec![
            Cell::new(&model.name).fg(Color::Cyan),
            Cell::new(format_size(model.size)).fg(Color::White),
            Cell::new(model.modified_at.as_deref().unwrap_or("-")).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} model{}",
        style(models.len()).bold(),
        if models.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

async fn pull_model(local: &LocalRuntimeBackend, name: &str, json: bool) -> Result<()> {
    if !json {
        println!(
            "  {} Pulling {} (this can take a while)...",
            style("↓").cyan().bold(),
            style(name).bold()
        );
    }
    local.pull_model(name).await?;

    if json {
        println!("{}", serde_json::json!({ "pulled": name }));
    } else {
        println!("  {} Pulled {}", style("✓").green().bold(), style(name).bold());
    }
    Ok(())
}

async fn delete_model(local: &LocalRuntimeBackend, name: &str, json: bool) -> Result<()> {
    local.delete_model(name).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": name }));
    } else {
        println!("  {} Deleted {}", style("✓").green().bold(), style(name).bold());
    }
    Ok(())
}

async fn bench_model(local: &LocalRuntimeBackend, model: &str, json: bool) -> Result<()> {
    let result = local.benchmark(model).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Benchmark").bold(), style(&result.model).cyan());
    println!("  {}", style("──────────").dim());
    println!("  Total:        {} ms", style(result.total_ms).bold());
    match result.first_token_ms {
        Some(ms) => println!("  First token:  {} ms", style(ms).bold()),
        None => println!("  First token:  {}", style("-").dim()),
    }
    println!("  Chunks:       {}", result.chunks);
    println!("  Throughput:   {:.1} chars/s", result.chars_per_second);
    println!();
    Ok(())
}

/// Human-readable byte count.
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
