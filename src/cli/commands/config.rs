//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::core::config::Config;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate a configuration file.
    Validate,
    /// Print the effective configuration (file + env overrides).
    Show,
    /// Print a configuration template.
    Generate {
        /// Output file path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, config_path: &Path) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(config_path),
        ConfigCommand::Show => show_config(config_path),
        ConfigCommand::Generate { output } => generate_config(output.as_deref()),
    }
}

fn validate_config(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("config file not found: {}", path.display());
    }
    let config = Config::from_file(path)?;
    config.validate()?;
    println!("{}: valid", path.display());
    if config.etcd_endpoints.is_empty() {
        println!("  note: no etcd endpoints configured, server will run in-memory");
    }
    if config.auth_token.is_empty() {
        println!("  note: auth_token is empty, authentication is disabled");
    }
    Ok(())
}

fn show_config(path: &Path) -> Result<()> {
    let config = Config::load_or_default(path)?;
    config.validate()?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn generate_config(output: Option<&Path>) -> Result<()> {
    let template = Config::template();
    match output {
        Some(path) => {
            std::fs::write(path, &template)?;
            println!("wrote {}", path.display());
        }
        None => print!("{template}"),
    }
    Ok(())
}
