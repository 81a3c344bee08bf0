//! Authoritative service registry.
//!
//! The registry owns the service map and mediates every mutation. Two
//! backends sit behind one mode flag, resolved once at construction:
//!
//! - **store-backed**: registrations are written to the external leased
//!   store before the in-memory view is updated; lease expiry is the
//!   source of truth for liveness and the cache refresher keeps the view
//!   converged (see `refresher`).
//! - **in-memory**: registrations live only here, paired with a `last_seen`
//!   timestamp that the janitor sweeps against (see `janitor`).
//!
//! A single reader/writer lock protects the view: mutations take the write
//! lock, discovery takes the read lock, and store I/O always happens before
//! the lock is acquired so critical sections stay short.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::core::error::{VoyagerError, VoyagerResult};
use crate::ops::observability::{metrics, MetricsRegistry};
use crate::store::{instance_key, KvStore, SERVICES_PREFIX};
use crate::wire::{HealthStatus, Registration};

/// Deadline for the initial bulk load from the store.
const INITIAL_LOAD_TIMEOUT: Duration = Duration::from_secs(3);

/// A registration plus the liveness timestamp used in in-memory mode.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub registration: Registration,
    pub last_seen: Instant,
}

/// Mutable registry state behind the lock.
struct State {
    /// Store-backed view: service name → instance id → registration.
    services: HashMap<String, HashMap<String, Registration>>,
    /// In-memory instances with last-seen tracking.
    instances: HashMap<String, HashMap<String, InstanceInfo>>,
    /// Lease length, sweep period base, and staleness horizon. Mutable under
    /// the lock so tests can shrink it deterministically.
    cache_ttl: Duration,
}

/// The authoritative service registry.
pub struct Registry {
    state: RwLock<State>,
    store: Option<Arc<dyn KvStore>>,
    in_memory: bool,
    metrics: Arc<MetricsRegistry>,
    janitor_started: Once,
}

impl Registry {
    /// Create an in-memory registry (no persistence).
    pub fn in_memory(cache_ttl: Duration, metrics_registry: Arc<MetricsRegistry>) -> Self {
        Self {
            state: RwLock::new(State {
                services: HashMap::new(),
                instances: HashMap::new(),
                cache_ttl,
            }),
            store: None,
            in_memory: true,
            metrics: metrics_registry,
            janitor_started: Once::new(),
        }
    }

    /// Create a store-backed registry, bulk-loading existing registrations.
    ///
    /// The load runs under a bounded deadline; failure is returned so the
    /// caller can decide to fall back to in-memory mode.
    pub async fn with_store(
        store: Arc<dyn KvStore>,
        cache_ttl: Duration,
        metrics_registry: Arc<MetricsRegistry>,
    ) -> VoyagerResult<Self> {
        let entries = tokio::time::timeout(INITIAL_LOAD_TIMEOUT, store.get_prefix(SERVICES_PREFIX))
            .await
            .map_err(|_| VoyagerError::store("initial load timed out"))??;

        let (services, skipped) = build_service_map(&entries);
        if skipped > 0 {
            tracing::warn!(skipped, "ignored unparseable registrations during initial load");
        }

        Ok(Self {
            state: RwLock::new(State {
                services,
                instances: HashMap::new(),
                cache_ttl,
            }),
            store: Some(store),
            in_memory: false,
            metrics: metrics_registry,
            janitor_started: Once::new(),
        })
    }

    /// Register an instance, replacing any prior record for the same
    /// `(service_name, instance_id)` and refreshing its lease.
    pub async fn register(&self, registration: Registration) -> VoyagerResult<()> {
        self.metrics.counter_inc_with(
            metrics::REGISTRATIONS_TOTAL,
            &[("service", &registration.service_name)],
        );

        validate_registration(&registration)?;

        if self.in_memory {
            let mut state = self.state.write();
            state
                .instances
                .entry(registration.service_name.clone())
                .or_default()
                .insert(
                    registration.instance_id.clone(),
                    InstanceInfo {
                        registration,
                        last_seen: Instant::now(),
                    },
                );
            return Ok(());
        }

        // Store write happens before the lock; the view is only updated on
        // success so a store failure leaves it untouched.
        let store = self.store_handle()?;
        let key = instance_key(&registration.service_name, &registration.instance_id);
        let value = serde_json::to_vec(&registration)
            .map_err(|e| VoyagerError::internal(format!("failed to serialize registration: {e}")))?;
        store.put(&key, &value, self.cache_ttl()).await?;

        let mut state = self.state.write();
        state
            .services
            .entry(registration.service_name.clone())
            .or_default()
            .insert(registration.instance_id.clone(), registration);
        Ok(())
    }

    /// Return the current instance set for a service.
    ///
    /// Always answered from the in-memory view, never from the store. In
    /// in-memory mode instances older than the cache TTL are filtered out
    /// regardless of `healthy_only`; in store-backed mode the flag is
    /// advisory since lease expiry already removes dead keys. The list is
    /// ordered by instance id so round-robin callers see a stable cycle.
    pub fn discover(&self, service_name: &str, _healthy_only: bool) -> Vec<Registration> {
        let state = self.state.read();

        let (mut instances, known) = if self.in_memory {
            match state.instances.get(service_name) {
                Some(map) => {
                    let ttl = state.cache_ttl;
                    let live: Vec<Registration> = map
                        .values()
                        .filter(|info| info.last_seen.elapsed() <= ttl)
                        .map(|info| info.registration.clone())
                        .collect();
                    (live, true)
                }
                None => (Vec::new(), false),
            }
        } else {
            match state.services.get(service_name) {
                Some(map) => (map.values().cloned().collect(), true),
                None => (Vec::new(), false),
            }
        };
        instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));

        let status = if known { "success" } else { "not_found" };
        self.metrics.counter_inc_with(
            metrics::DISCOVERIES_TOTAL,
            &[("service", service_name), ("status", status)],
        );

        instances
    }

    /// Record a health report for an instance.
    ///
    /// In-memory mode bumps `last_seen`; store-backed mode re-writes the
    /// stored record under a fresh lease. Renewal failures report
    /// `Unhealthy` without deleting the entry. Unknown instances report
    /// `Unhealthy`.
    pub async fn health_check(&self, service_name: &str, instance_id: &str) -> HealthStatus {
        if self.in_memory {
            let mut state = self.state.write();
            if let Some(info) = state
                .instances
                .get_mut(service_name)
                .and_then(|map| map.get_mut(instance_id))
            {
                info.last_seen = Instant::now();
                return HealthStatus::Healthy;
            }
            return HealthStatus::Unhealthy;
        }

        let (registration, ttl) = {
            let state = self.state.read();
            let Some(registration) = state
                .services
                .get(service_name)
                .and_then(|map| map.get(instance_id))
                .cloned()
            else {
                return HealthStatus::Unhealthy;
            };
            (registration, state.cache_ttl)
        };

        let Ok(store) = self.store_handle() else {
            return HealthStatus::Unhealthy;
        };
        let value = match serde_json::to_vec(&registration) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize registration for lease refresh");
                return HealthStatus::Unhealthy;
            }
        };

        let key = instance_key(service_name, instance_id);
        match store.put(&key, &value, ttl).await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                tracing::warn!(
                    service = service_name,
                    instance = instance_id,
                    error = %e,
                    "failed to refresh lease"
                );
                HealthStatus::Unhealthy
            }
        }
    }

    /// Remove an instance. Removing an absent instance succeeds.
    pub async fn deregister(&self, service_name: &str, instance_id: &str) -> VoyagerResult<()> {
        if !self.in_memory {
            let store = self.store_handle()?;
            store
                .delete(&instance_key(service_name, instance_id))
                .await?;
        }

        let mut state = self.state.write();
        if self.in_memory {
            let now_empty = match state.instances.get_mut(service_name) {
                Some(map) => {
                    map.remove(instance_id);
                    map.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.instances.remove(service_name);
            }
        } else {
            let now_empty = match state.services.get_mut(service_name) {
                Some(map) => {
                    map.remove(instance_id);
                    map.is_empty()
                }
                None => false,
            };
            if now_empty {
                state.services.remove(service_name);
            }
        }
        Ok(())
    }

    /// Remove every in-memory instance whose last report is older than the
    /// cache TTL. Returns the number of removals.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.state.write();
        let ttl = state.cache_ttl;
        let mut removed = 0;

        state.instances.retain(|service_name, map| {
            map.retain(|instance_id, info| {
                let live = info.last_seen.elapsed() <= ttl;
                if !live {
                    removed += 1;
                    tracing::info!(
                        service = %service_name,
                        instance = %instance_id,
                        "removed expired instance"
                    );
                }
                live
            });
            !map.is_empty()
        });

        removed
    }

    /// Atomically replace the store-backed view.
    ///
    /// A Register racing this swap can transiently disappear from the view
    /// until the next refresh; the window is bounded by half the cache TTL.
    pub fn replace_view(&self, services: HashMap<String, HashMap<String, Registration>>) {
        let mut state = self.state.write();
        state.services = services;
    }

    /// Per-service instance counts, for the gauge updater.
    pub fn instance_counts(&self) -> Vec<(String, usize)> {
        let state = self.state.read();
        if self.in_memory {
            state
                .instances
                .iter()
                .map(|(name, map)| (name.clone(), map.len()))
                .collect()
        } else {
            state
                .services
                .iter()
                .map(|(name, map)| (name.clone(), map.len()))
                .collect()
        }
    }

    /// Log the current service map, one line per instance.
    pub fn log_current_services(&self) {
        let state = self.state.read();
        if self.in_memory {
            for (service, instances) in &state.instances {
                tracing::info!(service = %service, instances = instances.len(), "registered service");
                for (id, info) in instances {
                    tracing::info!(
                        service = %service,
                        instance = %id,
                        endpoint = %info.registration.endpoint(),
                        last_seen_secs = info.last_seen.elapsed().as_secs(),
                        "  instance"
                    );
                }
            }
        } else {
            for (service, instances) in &state.services {
                tracing::info!(service = %service, instances = instances.len(), "registered service");
                for (id, registration) in instances {
                    tracing::info!(
                        service = %service,
                        instance = %id,
                        endpoint = %registration.endpoint(),
                        "  instance"
                    );
                }
            }
        }
    }

    /// Update the instance-count gauges from the current view.
    pub fn update_instance_gauges(&self) {
        for (service, count) in self.instance_counts() {
            self.metrics.gauge_set_with(
                metrics::SERVICE_INSTANCES,
                &[("service", &service)],
                count as u64,
            );
        }
    }

    /// Current cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        self.state.read().cache_ttl
    }

    /// Test hook: shrink or grow the TTL under the lock.
    pub fn set_cache_ttl(&self, ttl: Duration) {
        self.state.write().cache_ttl = ttl;
    }

    /// Whether this registry runs without an external store.
    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    /// The external store, when in store-backed mode.
    pub fn store(&self) -> Option<Arc<dyn KvStore>> {
        self.store.clone()
    }

    /// The metrics registry this registry reports into.
    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Start the in-memory expiry sweeper. Starting twice is a no-op; the
    /// loop exits when the shutdown channel flips.
    pub fn start_janitor(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        if !self.in_memory {
            return;
        }
        self.janitor_started.call_once(|| {
            let registry = Arc::clone(self);
            tokio::spawn(super::janitor::run(registry, shutdown));
        });
    }

    fn store_handle(&self) -> VoyagerResult<Arc<dyn KvStore>> {
        self.store
            .clone()
            .ok_or_else(|| VoyagerError::internal("registry has no store attached"))
    }
}

/// Reject registrations with empty required fields or an out-of-range port.
fn validate_registration(registration: &Registration) -> VoyagerResult<()> {
    if registration.service_name.is_empty()
        || registration.instance_id.is_empty()
        || registration.address.is_empty()
    {
        return Err(VoyagerError::invalid_argument("invalid registration data"));
    }
    if registration.port <= 0 || registration.port > u16::MAX as i32 {
        return Err(VoyagerError::invalid_argument("port out of range"));
    }
    Ok(())
}

/// Rebuild the service map from raw store entries.
///
/// Unparseable values are skipped, not fatal; the skip count is returned so
/// callers can log and count them.
pub(crate) fn build_service_map(
    entries: &BTreeMap<String, Vec<u8>>,
) -> (HashMap<String, HashMap<String, Registration>>, usize) {
    let mut services: HashMap<String, HashMap<String, Registration>> = HashMap::new();
    let mut skipped = 0;

    for value in entries.values() {
        match serde_json::from_slice::<Registration>(value) {
            Ok(registration) if !registration.service_name.is_empty() => {
                services
                    .entry(registration.service_name.clone())
                    .or_default()
                    .insert(registration.instance_id.clone(), registration);
            }
            _ => skipped += 1,
        }
    }

    (services, skipped)
}
