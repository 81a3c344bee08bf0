//! Configuration parsing and validation.
//!
//! Voyager configuration is loaded from TOML files, overridden by
//! `VOYAGER_*` environment variables, and finally by CLI flags. An absent
//! config file means defaults: an in-memory registry on `:50050`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level Voyager server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// etcd endpoints; empty selects in-memory mode.
    pub etcd_endpoints: Vec<String>,

    /// Cache TTL in seconds. Governs the store lease length, the refresher
    /// and janitor periods, and the client discovery cache horizon.
    pub cache_ttl_seconds: u64,

    /// Shared bearer token; empty disables authentication.
    pub auth_token: String,

    /// gRPC bind address.
    pub grpc_addr: String,

    /// Metrics HTTP bind address.
    pub metrics_addr: String,

    /// Interval between service-state log dumps, in seconds.
    pub log_interval_seconds: u64,

    /// Log format: "text" or "json".
    pub log_format: String,

    /// Enable debug logging.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            etcd_endpoints: Vec::new(),
            cache_ttl_seconds: 30,
            auth_token: String::new(),
            grpc_addr: ":50050".to_string(),
            metrics_addr: ":2112".to_string(),
            log_interval_seconds: 15,
            log_format: "text".to_string(),
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Load from a file when it exists, defaults otherwise; env always wins.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Apply `VOYAGER_*` environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(endpoints) = std::env::var("VOYAGER_ETCD_ENDPOINTS") {
            self.etcd_endpoints = endpoints
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(ttl) = std::env::var("VOYAGER_CACHE_TTL") {
            if let Ok(seconds) = ttl.parse() {
                self.cache_ttl_seconds = seconds;
            }
        }
        if let Ok(token) = std::env::var("VOYAGER_AUTH_TOKEN") {
            self.auth_token = token;
        }
        if let Ok(addr) = std::env::var("VOYAGER_GRPC_ADDR") {
            self.grpc_addr = addr;
        }
        if let Ok(addr) = std::env::var("VOYAGER_METRICS_ADDR") {
            self.metrics_addr = addr;
        }
        if let Ok(interval) = std::env::var("VOYAGER_LOG_INTERVAL") {
            if let Ok(seconds) = interval.parse() {
                self.log_interval_seconds = seconds;
            }
        }
        if let Ok(format) = std::env::var("VOYAGER_LOG_FORMAT") {
            self.log_format = format;
        }
        if let Ok(debug) = std::env::var("VOYAGER_DEBUG") {
            self.debug = matches!(debug.as_str(), "1" | "true" | "yes");
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_seconds == 0 {
            anyhow::bail!("cache_ttl_seconds must be non-zero");
        }
        if self.log_format != "text" && self.log_format != "json" {
            anyhow::bail!(
                "log_format must be \"text\" or \"json\", got {:?}",
                self.log_format
            );
        }
        self.grpc_socket_addr()
            .context("invalid grpc_addr")
            .map(|_| ())?;
        self.metrics_socket_addr()
            .context("invalid metrics_addr")
            .map(|_| ())?;
        Ok(())
    }

    /// Cache TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Service-log interval as a duration.
    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_seconds)
    }

    /// Whether the registry runs without an external store.
    pub fn is_in_memory(&self) -> bool {
        self.etcd_endpoints.is_empty()
    }

    /// gRPC bind address as a socket address.
    pub fn grpc_socket_addr(&self) -> Result<SocketAddr> {
        parse_bind_addr(&self.grpc_addr)
    }

    /// Metrics bind address as a socket address.
    pub fn metrics_socket_addr(&self) -> Result<SocketAddr> {
        parse_bind_addr(&self.metrics_addr)
    }

    /// A commented TOML template with all defaults.
    pub fn template() -> String {
        let defaults = Self::default();
        format!(
            r#"# Voyager discovery server configuration.

# etcd endpoints; leave empty to run in-memory without persistence.
etcd_endpoints = []

# Lease length, refresher/janitor period base, and client cache horizon.
cache_ttl_seconds = {}

# Shared bearer token; empty disables authentication.
auth_token = ""

# Bind addresses.
grpc_addr = "{}"
metrics_addr = "{}"

# Logging.
log_interval_seconds = {}
log_format = "{}"
debug = {}
"#,
            defaults.cache_ttl_seconds,
            defaults.grpc_addr,
            defaults.metrics_addr,
            defaults.log_interval_seconds,
            defaults.log_format,
            defaults.debug,
        )
    }
}

/// Bind addresses of the form `:port` normalize to `0.0.0.0:port`.
fn parse_bind_addr(addr: &str) -> Result<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    normalized
        .parse()
        .with_context(|| format!("cannot parse bind address {addr:?}"))
}
