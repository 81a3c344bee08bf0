//! Start command implementation.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::core::config::Config;
use crate::core::runtime::Runtime;

/// Start the discovery server.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// etcd endpoints, comma separated; empty selects in-memory mode.
    #[arg(long, value_delimiter = ',')]
    pub etcd_endpoints: Option<Vec<String>>,

    /// Cache TTL in seconds.
    #[arg(long)]
    pub cache_ttl: Option<u64>,

    /// Authentication token; empty disables auth.
    #[arg(long)]
    pub auth_token: Option<String>,

    /// gRPC bind address.
    #[arg(long)]
    pub grpc_addr: Option<String>,

    /// Metrics HTTP bind address.
    #[arg(long)]
    pub metrics_addr: Option<String>,

    /// Service logging interval in seconds.
    #[arg(long)]
    pub log_interval: Option<u64>,

    /// Log format (text, json).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

impl StartArgs {
    /// Overlay CLI flags on a loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(endpoints) = &self.etcd_endpoints {
            config.etcd_endpoints = endpoints
                .iter()
                .filter(|e| !e.is_empty())
                .cloned()
                .collect();
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache_ttl_seconds = ttl;
        }
        if let Some(token) = &self.auth_token {
            config.auth_token = token.clone();
        }
        if let Some(addr) = &self.grpc_addr {
            config.grpc_addr = addr.clone();
        }
        if let Some(addr) = &self.metrics_addr {
            config.metrics_addr = addr.clone();
        }
        if let Some(interval) = self.log_interval {
            config.log_interval_seconds = interval;
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if self.debug {
            config.debug = true;
        }
    }
}

/// Run the start command.
pub async fn run_start(args: StartArgs, config_path: &PathBuf) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.log_format, config.debug);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "starting voyager discovery server"
    );

    let mut runtime = Runtime::new(config).await?;
    runtime.run().await
}

fn init_tracing(format: &str, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}
