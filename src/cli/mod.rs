//! Command-line interface.
//!
//! Unified CLI for the Voyager discovery server.

pub mod commands;

use clap::{Parser, Subcommand};

/// Voyager - service-discovery control plane.
#[derive(Parser, Debug)]
#[command(name = "voyagerd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the discovery server.
    Start(commands::StartArgs),
    /// Show server status via the metrics endpoint.
    Status(commands::StatusArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
