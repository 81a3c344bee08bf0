//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;

use voyager::core::error::{VoyagerError, VoyagerResult};
use voyager::ops::observability::MetricsRegistry;
use voyager::registry::{AuthGate, DiscoveryService, Registry};
use voyager::store::KvStore;
use voyager::wire::{DiscoveryServer, Registration};

/// Build a registration with the common test defaults.
pub fn test_registration(service: &str, instance: &str, address: &str, port: i32) -> Registration {
    Registration {
        service_name: service.to_string(),
        instance_id: instance.to_string(),
        address: address.to_string(),
        port,
        metadata: HashMap::new(),
    }
}

/// In-process leased store double.
///
/// Implements the same observable lease semantics as etcd: a value put with
/// a TTL disappears from reads once the TTL elapses without a refresh.
/// Failure injection covers the store-outage paths.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    fail_puts: AtomicBool,
    fail_reads: AtomicBool,
}

struct StoredValue {
    value: Vec<u8>,
    expires_at: Instant,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        })
    }

    /// Make subsequent puts fail.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::Release);
    }

    /// Make subsequent reads (and the status probe) fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    /// Insert raw bytes, bypassing failure injection (for seeding garbage).
    pub fn put_raw(&self, key: &str, value: &[u8], ttl: Duration) {
        self.entries.lock().insert(
            key.to_string(),
            StoredValue {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of live (unexpired) keys.
    pub fn live_keys(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|v| v.expires_at > now)
            .count()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> VoyagerResult<()> {
        if self.fail_puts.load(Ordering::Acquire) {
            return Err(VoyagerError::store("induced put failure"));
        }
        self.put_raw(key, value, ttl);
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> VoyagerResult<BTreeMap<String, Vec<u8>>> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(VoyagerError::store("induced read failure"));
        }
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.expires_at > now)
            .map(|(key, stored)| (key.clone(), stored.value.clone()))
            .collect())
    }

    async fn delete(&self, key: &str) -> VoyagerResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn status(&self) -> VoyagerResult<()> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(VoyagerError::store("induced status failure"));
        }
        Ok(())
    }
}

/// A discovery server bound to an ephemeral local port.
pub struct TestServer {
    /// `host:port` the server listens on.
    pub addr: String,
    /// The registry behind the server, for direct state inspection.
    pub registry: Arc<Registry>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl TestServer {
    /// Signal shutdown and wait for the server to drain.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Spawn an in-memory discovery server. Empty token disables auth.
pub async fn spawn_server(auth_token: &str, cache_ttl: Duration) -> TestServer {
    let metrics = Arc::new(MetricsRegistry::new());
    let registry = Arc::new(Registry::in_memory(cache_ttl, metrics));
    spawn_server_with_registry(auth_token, registry).await
}

/// Spawn a discovery server around an existing registry.
pub async fn spawn_server_with_registry(auth_token: &str, registry: Arc<Registry>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let service = DiscoveryServer::with_interceptor(
        DiscoveryService::new(Arc::clone(&registry)),
        AuthGate::new(auth_token),
    );

    let handle = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
    });

    TestServer {
        addr: addr.to_string(),
        registry,
        shutdown: shutdown_tx,
        handle,
    }
}
