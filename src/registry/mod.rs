//! Registry server internals.
//!
//! - [`core`] - the authoritative service map and its two backends
//! - [`service`] - gRPC handler and auth gate
//! - [`refresher`] - store-to-view resync loop (store-backed mode)
//! - [`janitor`] - expiry sweeper (in-memory mode)

pub mod core;
pub mod janitor;
pub mod refresher;
pub mod service;

use std::sync::Arc;

use crate::core::config::Config;
use crate::ops::observability::MetricsRegistry;
use crate::store::{EtcdStore, KvStore};

pub use self::core::{InstanceInfo, Registry};
pub use service::{AuthGate, DiscoveryService};

/// Build a registry for the given configuration.
///
/// The backend decision is made exactly once, here: no endpoints, an
/// unreachable store, or a failed initial load all degrade to in-memory
/// mode with a warning. The server never flips modes at runtime.
pub async fn connect_registry(config: &Config, metrics: Arc<MetricsRegistry>) -> Arc<Registry> {
    if config.etcd_endpoints.is_empty() {
        tracing::warn!("running in in-memory mode without persistence");
        return Arc::new(Registry::in_memory(config.cache_ttl(), metrics));
    }

    let store = match EtcdStore::connect(&config.etcd_endpoints).await {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(error = %e, "failed to connect to etcd, switching to in-memory mode");
            return Arc::new(Registry::in_memory(config.cache_ttl(), metrics));
        }
    };

    let store: Arc<dyn KvStore> = Arc::new(store);
    if let Err(e) = store.status().await {
        tracing::warn!(error = %e, "etcd liveness probe failed, switching to in-memory mode");
        return Arc::new(Registry::in_memory(config.cache_ttl(), metrics));
    }
    match Registry::with_store(store, config.cache_ttl(), Arc::clone(&metrics)).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::warn!(error = %e, "failed to load initial data, switching to in-memory mode");
            Arc::new(Registry::in_memory(config.cache_ttl(), metrics))
        }
    }
}
