//! CLI command definitions for the `dmrelay` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod conversation;
pub mod maintenance;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Relay direct-message conversations between a chat platform and an operator dashboard.
#[derive(Parser)]
#[command(name = "dmrelay", version, about, long_about = None)]
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

    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and live event stream.
    Serve {
        /// Port to listen on (overrides config).
        #[arg(long, env = "DMRELAY_PORT")]
        port: Option<u16>,

        /// Host to bind to (overrides config).
        #[arg(long, env = "DMRELAY_HOST")]
        host: Option<String>,
    },

    /// Repair stored timestamps and report what the cache would load.
    Reload,

    /// Run the timestamp repair pass only.
    Repair,

    /// Import a legacy JSON conversation file.
    Import {
        /// Path to the JSON document.
        file: PathBuf,
    },

    /// List stored conversations, most recent first.
    #[command(alias = "ls")]
    List,

    /// Show one conversation with its messages.
    Show {
        /// User id of the conversation.
        user_id: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
