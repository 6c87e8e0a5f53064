//! CLI command definitions for the `colloquy` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod ask;
pub mod health;
pub mod models;
pub mod search;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat orchestration server for hosted and local AI backends.
#[derive(Parser)]
#[command(name = "colloquy", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Config file to load instead of `{data_dir}/config.toml`.
    #[arg(long, global = true, env = "COLLOQUY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on (overrides `server.port`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides `server.host`).
        #[arg(long)]
        host: Option<String>,
    },

    /// Probe every configured backend.
    Health,

    /// Send one message and stream the answer to stdout.
    Ask {
        /// Message text.
        message: String,

        /// Model hint: `auto`, a backend alias, or a model id.
        #[arg(short, long)]
        model: Option<String>,

        /// Conversation id to continue.
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Manage models installed in the local runtime.
    Models {
        #[command(subcommand)]
        action: models::ModelsCommand,
    },

    /// Inspect or switch the search-augmented variant.
    Search {
        #[command(subcommand)]
        action: search::SearchCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
