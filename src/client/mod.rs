//! Discovery client.
//!
//! One [`VoyagerClient`] per process: it connects to the registry with
//! retry, registers this process's service, keeps the registration alive
//! through the health loop, and answers "give me a live connection for
//! service X" from its cache, balancer and connection pool.

pub mod balancer;
pub mod cache;
pub mod health;
pub mod options;
pub mod pool;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::core::error::{VoyagerError, VoyagerResult};
use crate::wire::{DiscoveryClient, InstanceId, Registration, ServiceQuery};

pub use balancer::{balancer_for, LoadBalancer};
pub use cache::DiscoveryCache;
pub use options::{BalancerStrategy, ClientOptions};
pub use pool::ConnectionPool;

/// Deadline for each control RPC (register, discover, health, deregister).
pub(crate) const RPC_TIMEOUT: Duration = Duration::from_secs(3);

/// What this process registered, kept for health checks and re-register.
#[derive(Debug, Clone)]
pub(crate) struct RegistrationState {
    pub service_name: String,
    pub instance_id: String,
    pub address: String,
    pub port: u16,
    pub metadata: HashMap<String, String>,
}

struct HealthHandle {
    shutdown: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

/// Client for the discovery control plane.
pub struct VoyagerClient {
    rpc: DiscoveryClient<Channel>,
    cache: DiscoveryCache,
    pool: Arc<ConnectionPool>,
    balancer: Arc<dyn LoadBalancer>,
    options: ClientOptions,
    registration: Arc<Mutex<Option<RegistrationState>>>,
    health: Mutex<Option<HealthHandle>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for VoyagerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoyagerClient").finish_non_exhaustive()
    }
}

impl VoyagerClient {
    /// Connect to the discovery service, retrying per the options.
    ///
    /// Exhausting the retry budget is fatal to construction.
    pub async fn connect(discovery_addr: &str, options: ClientOptions) -> VoyagerResult<Self> {
        if discovery_addr.is_empty() {
            return Err(VoyagerError::invalid_argument(
                "discovery address cannot be empty",
            ));
        }

        tracing::info!(addr = %discovery_addr, "connecting to discovery service");
        let channel = connect_with_retry(discovery_addr, &options).await?;
        tracing::info!("connected to discovery service");

        let pool = Arc::new(ConnectionPool::new(
            options.connection_timeout,
            options.monitor_interval,
        ));
        let balancer = balancer_for(options.balancer, Arc::clone(&pool));
        let cache = DiscoveryCache::new(options.cache_ttl);

        Ok(Self {
            rpc: DiscoveryClient::new(channel),
            cache,
            pool,
            balancer,
            options,
            registration: Arc::new(Mutex::new(None)),
            health: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Register this process's service and start the health loop.
    pub async fn register(
        &self,
        service_name: &str,
        address: &str,
        port: u16,
        metadata: HashMap<String, String>,
    ) -> VoyagerResult<()> {
        if service_name.is_empty() || address.is_empty() || port == 0 {
            return Err(VoyagerError::invalid_argument(
                "invalid registration parameters",
            ));
        }

        let instance_id = {
            let mut state = self.registration.lock();
            let instance_id = state
                .as_ref()
                .map(|s| s.instance_id.clone())
                .or_else(|| self.options.instance_id.clone())
                .unwrap_or_else(generate_instance_id);
            *state = Some(RegistrationState {
                service_name: service_name.to_string(),
                instance_id: instance_id.clone(),
                address: address.to_string(),
                port,
                metadata: metadata.clone(),
            });
            instance_id
        };

        let registration = Registration {
            service_name: service_name.to_string(),
            instance_id,
            address: address.to_string(),
            port: port as i32,
            metadata,
        };

        let request = with_auth(registration, &self.options.auth_token)?;
        let mut rpc = self.rpc.clone();
        let ack = tokio::time::timeout(RPC_TIMEOUT, rpc.register(request))
            .await
            .map_err(|_| VoyagerError::Rpc(tonic::Status::deadline_exceeded("register timed out")))??
            .into_inner();

        if !ack.success {
            return Err(VoyagerError::internal(format!(
                "registration failed: {}",
                ack.error
            )));
        }

        self.start_health_checks();
        Ok(())
    }

    /// Resolve `service_name` to a live pooled connection.
    ///
    /// Cache hit or a fresh Discover, balancer pick, then the pool dials or
    /// reuses the transport for the chosen `host:port`.
    pub async fn discover(&self, service_name: &str) -> VoyagerResult<Channel> {
        let instances = self.service_instances(service_name).await?;
        if instances.is_empty() {
            return Err(VoyagerError::NoInstances {
                service: service_name.to_string(),
            });
        }

        let selected = self
            .balancer
            .select(service_name, &instances)
            .ok_or_else(|| VoyagerError::NoInstances {
                service: service_name.to_string(),
            })?;

        self.pool.get(&selected.endpoint()).await
    }

    /// Remove this process's registration and stop the health loop.
    pub async fn deregister(&self) -> VoyagerResult<()> {
        let state = self
            .registration
            .lock()
            .clone()
            .ok_or_else(|| VoyagerError::invalid_argument("service not registered"))?;

        self.stop_health_checks();

        let request = with_auth(
            InstanceId {
                service_name: state.service_name.clone(),
                instance_id: state.instance_id.clone(),
            },
            &self.options.auth_token,
        )?;
        let mut rpc = self.rpc.clone();
        let ack = tokio::time::timeout(RPC_TIMEOUT, rpc.deregister(request))
            .await
            .map_err(|_| {
                VoyagerError::Rpc(tonic::Status::deadline_exceeded("deregister timed out"))
            })??
            .into_inner();

        if !ack.success {
            return Err(VoyagerError::internal(format!(
                "deregistration failed: {}",
                ack.error
            )));
        }
        Ok(())
    }

    /// Stop background work and release pooled connections. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_health_checks();
        self.pool.close();
    }

    /// The connection pool, for refcount inspection and releases.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// The discovery cache.
    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    /// The instance id in effect after `register`.
    pub fn instance_id(&self) -> Option<String> {
        self.registration.lock().as_ref().map(|s| s.instance_id.clone())
    }

    /// Whether the health loop is currently running.
    pub fn health_loop_running(&self) -> bool {
        self.health.lock().is_some()
    }

    async fn service_instances(&self, service_name: &str) -> VoyagerResult<Vec<Registration>> {
        if let Some(instances) = self.cache.get(service_name) {
            return Ok(instances);
        }

        let request = with_auth(
            ServiceQuery {
                service_name: service_name.to_string(),
                healthy_only: true,
            },
            &self.options.auth_token,
        )?;
        let mut rpc = self.rpc.clone();
        let list = tokio::time::timeout(RPC_TIMEOUT, rpc.discover(request))
            .await
            .map_err(|_| VoyagerError::Rpc(tonic::Status::deadline_exceeded("discover timed out")))??
            .into_inner();

        self.cache.insert(service_name, list.instances.clone());
        Ok(list.instances)
    }

    /// Idempotent: a second start while a loop runs is a no-op.
    fn start_health_checks(&self) {
        let mut guard = self.health.lock();
        if guard.is_some() {
            return;
        }

        let interval = self
            .options
            .effective_health_interval(self.options.cache_ttl);
        let state = self.registration.lock().clone();
        if let Some(state) = &state {
            tracing::info!(
                service = %state.service_name,
                instance = %state.instance_id,
                interval_secs = interval.as_secs_f64(),
                "starting health checks"
            );
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(health::run(
            health::HealthLoop {
                rpc: self.rpc.clone(),
                registration: Arc::clone(&self.registration),
                auth_token: self.options.auth_token.clone(),
                interval,
            },
            shutdown_rx,
        ));

        *guard = Some(HealthHandle {
            shutdown: shutdown_tx,
            _task: task,
        });
    }

    fn stop_health_checks(&self) {
        if let Some(handle) = self.health.lock().take() {
            let _ = handle.shutdown.send(true);
        }
    }
}

impl Drop for VoyagerClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Attach the bearer token, when configured, to an outgoing request.
pub(crate) fn with_auth<T>(message: T, token: &Option<String>) -> VoyagerResult<Request<T>> {
    let mut request = Request::new(message);
    if let Some(token) = token {
        let value = MetadataValue::try_from(token.as_str())
            .map_err(|_| VoyagerError::invalid_argument("auth token is not valid metadata"))?;
        request
            .metadata_mut()
            .insert(crate::registry::service::AUTHORIZATION_KEY, value);
    }
    Ok(request)
}

/// `<hostname>-<unix-nanos>`: unique enough within a fleet, readable in logs.
pub(crate) fn generate_instance_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{host}-{nanos}")
}

async fn connect_with_retry(addr: &str, options: &ClientOptions) -> VoyagerResult<Channel> {
    let uri = pool::http_uri(addr);
    let mut last_error = String::new();

    for attempt in 1..=options.max_retries {
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(VoyagerError::from)?
            .connect_timeout(options.connection_timeout);
        match endpoint.connect().await {
            Ok(channel) => return Ok(channel),
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_retries = options.max_retries,
                    error = %e,
                    "connection attempt failed"
                );
                last_error = e.to_string();
            }
        }
        if attempt < options.max_retries {
            tokio::time::sleep(options.retry_delay).await;
        }
    }

    Err(VoyagerError::internal(format!(
        "failed to connect after {} attempts: {last_error}",
        options.max_retries
    )))
}
