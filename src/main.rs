//! Voyager - unified CLI entrypoint.
//!
//! Usage:
//!   voyagerd start [--config config/voyager.toml] [--grpc-addr :50050] ...
//!   voyagerd status [--endpoint localhost:2112]
//!   voyagerd config validate --config config/voyager.toml
//!   voyagerd config generate [--output config/voyager.toml]

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use voyager::cli::commands::{run_config, run_start, run_status};
use voyager::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global --config or the conventional default location
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/voyager.toml"));

    match cli.command {
        Commands::Start(args) => run_start(args, &config_path).await,
        Commands::Status(args) => run_status(args).await,
        Commands::Config(args) => run_config(args, &config_path),
    }
}
