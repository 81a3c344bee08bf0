//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Construction: config validation → registry (mode decision) → socket
//!   binds. Bind failures are construction errors so the process exits
//!   non-zero before serving anything.
//! - Start: gRPC listener → metrics endpoint → refresher or janitor →
//!   periodic tickers.
//! - Shutdown: one watch channel fans out to every background task; the
//!   gRPC server drains gracefully with a bounded timeout, then remaining
//!   tasks are aborted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;

use crate::core::config::Config;
use crate::ops::observability::{serve_metrics, MetricsRegistry};
use crate::registry::{connect_registry, refresher, AuthGate, DiscoveryService, Registry};
use crate::wire::DiscoveryServer;

/// Grace period for outstanding calls at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Period for recomputing the instance-count gauges.
const METRICS_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Voyager server runtime holding all component handles.
pub struct Runtime {
    config: Arc<Config>,
    registry: Arc<Registry>,
    metrics: Arc<MetricsRegistry>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,

    grpc_listener: Option<TcpListener>,
    metrics_listener: Option<TcpListener>,
    grpc_addr: SocketAddr,
    metrics_addr: SocketAddr,

    grpc_handle: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
    background: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Validate the configuration, build the registry and bind sockets.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let metrics = Arc::new(MetricsRegistry::new());
        let registry = connect_registry(&config, Arc::clone(&metrics)).await;

        let grpc_listener = TcpListener::bind(config.grpc_socket_addr()?)
            .await
            .with_context(|| format!("failed to bind gRPC address {}", config.grpc_addr))?;
        let metrics_listener = TcpListener::bind(config.metrics_socket_addr()?)
            .await
            .with_context(|| format!("failed to bind metrics address {}", config.metrics_addr))?;

        let grpc_addr = grpc_listener.local_addr()?;
        let metrics_addr = metrics_listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            registry,
            metrics,
            shutdown_tx,
            shutdown_rx,
            grpc_listener: Some(grpc_listener),
            metrics_listener: Some(metrics_listener),
            grpc_addr,
            metrics_addr,
            grpc_handle: None,
            background: Vec::new(),
        })
    }

    /// The bound gRPC address (useful with a `:0` bind).
    pub fn grpc_addr(&self) -> SocketAddr {
        self.grpc_addr
    }

    /// The bound metrics address.
    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    /// The registry this runtime serves.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Start all components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            grpc = %self.grpc_addr,
            metrics = %self.metrics_addr,
            in_memory = self.registry.is_in_memory(),
            "starting voyager runtime"
        );

        self.start_grpc()?;
        self.start_metrics_endpoint()?;
        self.start_registry_maintenance();
        self.start_tickers();

        tracing::info!("voyager runtime started");
        Ok(())
    }

    fn start_grpc(&mut self) -> Result<()> {
        let listener = self
            .grpc_listener
            .take()
            .context("gRPC listener already consumed")?;
        let incoming = TcpListenerStream::new(listener);

        let service = DiscoveryServer::with_interceptor(
            DiscoveryService::new(Arc::clone(&self.registry)),
            AuthGate::new(&self.config.auth_token),
        );
        let shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(incoming, wait_for_shutdown(shutdown_rx))
                .await
        });
        self.grpc_handle = Some(handle);
        tracing::info!(addr = %self.grpc_addr, "gRPC listener started");
        Ok(())
    }

    fn start_metrics_endpoint(&mut self) -> Result<()> {
        let listener = self
            .metrics_listener
            .take()
            .context("metrics listener already consumed")?;
        let registry = Arc::clone(&self.metrics);
        let shutdown_rx = self.shutdown_rx.clone();

        self.background
            .push(tokio::spawn(serve_metrics(listener, registry, shutdown_rx)));
        tracing::info!(addr = %self.metrics_addr, "metrics endpoint started");
        Ok(())
    }

    /// Spawn whichever expiry mechanism the mode needs.
    fn start_registry_maintenance(&mut self) {
        if let Some(store) = self.registry.store() {
            let registry = Arc::clone(&self.registry);
            let shutdown_rx = self.shutdown_rx.clone();
            self.background
                .push(tokio::spawn(refresher::run(registry, store, shutdown_rx)));
            tracing::info!("cache refresher started");
        } else {
            self.registry.start_janitor(self.shutdown_rx.clone());
            tracing::info!("janitor started");
        }
    }

    fn start_tickers(&mut self) {
        // Periodic service-state dump.
        let registry = Arc::clone(&self.registry);
        let interval = self.config.log_interval();
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.background.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => registry.log_current_services(),
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        }));

        // Instance-count gauge updater.
        let registry = Arc::clone(&self.registry);
        let mut shutdown_rx = self.shutdown_rx.clone();
        self.background.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(METRICS_UPDATE_INTERVAL) => registry.update_instance_gauges(),
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        }));
    }

    /// Run until SIGINT/SIGTERM or a fatal serve error.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut grpc_handle = self
            .grpc_handle
            .take()
            .context("gRPC server was not started")?;

        // A completed handle must not be polled again in stop(), so it is
        // only put back when the signal branch wins.
        let serve_result = tokio::select! {
            _ = shutdown_signal() => {
                tracing::warn!("shutdown signal received");
                self.grpc_handle = Some(grpc_handle);
                Ok(())
            }
            result = &mut grpc_handle => {
                match result {
                    Ok(Ok(())) => {
                        tracing::info!("gRPC server stopped");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(anyhow::anyhow!("gRPC server failed: {e}")),
                    Err(e) => Err(anyhow::anyhow!("gRPC server task panicked: {e}")),
                }
            }
        };

        self.stop().await?;
        serve_result
    }

    /// Trigger graceful shutdown without waiting.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop all components, bounding the drain at the shutdown timeout.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping voyager runtime");
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.grpc_handle.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => tracing::info!("gRPC server stopped gracefully"),
                Ok(Ok(Err(e))) => tracing::warn!(error = %e, "gRPC server stopped with error"),
                Ok(Err(e)) => tracing::warn!(error = %e, "gRPC server task panicked"),
                Err(_) => tracing::warn!("gRPC server forced to stop"),
            }
        }

        for task in self.background.drain(..) {
            task.abort();
        }

        tracing::info!("voyager runtime stopped");
        Ok(())
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
