//! Metrics and health endpoints.
//!
//! Counters and gauges live in an in-process registry with Prometheus text
//! exposition served from a minimal HTTP endpoint (`/metrics`, `/healthz`,
//! `/readyz`). Updates are lock-free on the hot path: the name map is
//! read-locked, the values are atomics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Metric names.
pub mod metrics {
    /// Total service registrations, labeled by service.
    pub const REGISTRATIONS_TOTAL: &str = "voyager_registrations_total";
    /// Total discoveries, labeled by service and outcome.
    pub const DISCOVERIES_TOTAL: &str = "voyager_discoveries_total";
    /// Current instance count, labeled by service.
    pub const SERVICE_INSTANCES: &str = "voyager_service_instances";
    /// Cache refresh attempts.
    pub const CACHE_REFRESHES_TOTAL: &str = "voyager_cache_refreshes_total";
    /// Cache refresh failures (including unparseable records).
    pub const CACHE_REFRESH_ERRORS_TOTAL: &str = "voyager_cache_refresh_errors_total";
}

/// In-process metrics registry.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Counter metrics, keyed by exposition name (labels included).
    counters: RwLock<BTreeMap<String, AtomicU64>>,
    /// Gauge metrics, keyed the same way.
    gauges: RwLock<BTreeMap<String, AtomicU64>>,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment an unlabeled counter.
    pub fn counter_inc(&self, name: &str) {
        self.counter_add(name.to_string(), 1);
    }

    /// Increment a counter with label pairs.
    pub fn counter_inc_with(&self, name: &str, labels: &[(&str, &str)]) {
        self.counter_add(keyed(name, labels), 1);
    }

    fn counter_add(&self, key: String, value: u64) {
        {
            let counters = self.counters.read().unwrap();
            if let Some(counter) = counters.get(&key) {
                counter.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().unwrap();
        counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Read an unlabeled counter.
    pub fn counter_get(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Read a labeled counter.
    pub fn counter_get_with(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .unwrap()
            .get(&keyed(name, labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set a gauge with label pairs.
    pub fn gauge_set_with(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        let key = keyed(name, labels);
        {
            let gauges = self.gauges.read().unwrap();
            if let Some(gauge) = gauges.get(&key) {
                gauge.store(value, Ordering::Relaxed);
                return;
            }
        }
        let mut gauges = self.gauges.write().unwrap();
        gauges
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Read a labeled gauge.
    pub fn gauge_get_with(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.gauges
            .read()
            .unwrap()
            .get(&keyed(name, labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.counters.read().unwrap().iter() {
            out.push_str(key);
            out.push(' ');
            out.push_str(&value.load(Ordering::Relaxed).to_string());
            out.push('\n');
        }
        for (key, value) in self.gauges.read().unwrap().iter() {
            out.push_str(key);
            out.push(' ');
            out.push_str(&value.load(Ordering::Relaxed).to_string());
            out.push('\n');
        }
        out
    }
}

fn keyed(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{name}{{{}}}", rendered.join(","))
}

/// Serve `/metrics`, `/healthz` and `/readyz` on `listener`.
///
/// Minimal hand-rolled HTTP: one request per connection, enough for scrapers
/// and probes. Exits when the shutdown channel flips.
pub async fn serve_metrics(
    listener: TcpListener,
    registry: std::sync::Arc<MetricsRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((mut socket, _addr)) => {
                        let registry = std::sync::Arc::clone(&registry);
                        tokio::spawn(async move {
                            if let Err(err) = handle_conn(&mut socket, &registry).await {
                                tracing::warn!(error = %err, "metrics handler error");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "metrics accept error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("metrics endpoint shutting down");
                    return;
                }
            }
        }
    }
}

async fn handle_conn(
    socket: &mut tokio::net::TcpStream,
    registry: &MetricsRegistry,
) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    let n = socket.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, body) = match path {
        "/metrics" => ("200 OK", registry.render()),
        "/healthz" | "/ready" | "/readyz" | "/health" => ("200 OK", "ok\n".to_string()),
        _ => ("404 Not Found", "not found\n".to_string()),
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}
