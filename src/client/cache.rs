//! Per-service discovery cache.
//!
//! Memoizes the last instance list returned for each service, valid for the
//! cache TTL from the time of storage. Expiry is per-entry; there is no
//! explicit invalidation on the hot path. A zero TTL disables caching.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::wire::Registration;

struct CacheEntry {
    instances: Vec<Registration>,
    stored_at: Instant,
}

/// Service name → last instance list, TTL-bounded.
pub struct DiscoveryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// A fresh entry for `service_name`, if any.
    pub fn get(&self, service_name: &str) -> Option<Vec<Registration>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read();
        let entry = entries.get(service_name)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.instances.clone())
    }

    /// Store the instance list for `service_name`, resetting its clock.
    pub fn insert(&self, service_name: &str, instances: Vec<Registration>) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.write().insert(
            service_name.to_string(),
            CacheEntry {
                instances,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop one entry (test and failover aid).
    pub fn invalidate(&self, service_name: &str) {
        self.entries.write().remove(service_name);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
