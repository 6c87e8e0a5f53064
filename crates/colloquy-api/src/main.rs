//! Colloquy CLI and REST API entry point.
//!
//! Binary name: `colloquy`
//!
//! Parses CLI arguments, initializes tracing and services, then dispatches
//! to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use std::net::SocketAddr;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use colloquy_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "colloquy", &mut std::io::stdout());
        return Ok(());
    }

    let mut tracing_options = TracingOptions::from_verbosity(cli.verbose, cli.quiet);
    tracing_options.json = cli.log_json;
    tracing_options.otel = cli.otel;
    init_tracing(&tracing_options)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve { port, host } => serve(state, host, port).await?,
        Commands::Health => cli::health::health(&state, cli.json).await?,
        Commands::Ask {
            message,
            model,
            conversation,
        } => cli::ask::ask(&state, message, model, conversation, cli.json).await?,
        Commands::Models { action } => {
            cli::models::handle_models_command(action, &state, cli.json).await?;
        }
        Commands::Search { action } => {
            cli::search::handle_search_command(action, &state, cli.json).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let backends: Vec<String> = state
        .gateway()
        .backends()
        .iter()
        .map(|b| b.name().to_string())
        .collect();
    tracing::info!(%addr, ?backends, "Starting Colloquy API");
    if backends.is_empty() {
        tracing::warn!("No chat backends configured; chat requests will fail with backend_unreachable");
    }

    println!(
        "  {} Colloquy API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let maintenance_cancel = CancellationToken::new();
    let sweeps = state.spawn_maintenance(maintenance_cancel.clone());

    let router = http::router::build_router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    maintenance_cancel.cancel();
    for sweep in sweeps {
        if let Err(e) = sweep.await {
            tracing::warn!(error = %e, "Maintenance task ended abnormally");
        }
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
