//! External key/value store abstraction.
//!
//! The registry persists registrations in a strongly-consistent, leased
//! store. The contract that matters is lease expiry: a `put` attaches a TTL
//! lease, and absence of any further `put` for the same key within the TTL
//! makes the key disappear. Everything else (prefix reads, deletes, the
//! liveness probe) is conventional.
//!
//! Running without a store is legal: the registry then keeps registrations
//! in memory and expires them itself (see `registry::janitor`).

pub mod etcd;
pub mod etcdpb;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::VoyagerResult;

pub use etcd::EtcdStore;

/// Reserved key prefix for registry records.
pub const SERVICES_PREFIX: &str = "/services/";

/// Store key for one instance: `/services/<service>/<instance>`.
pub fn instance_key(service_name: &str, instance_id: &str) -> String {
    format!("{SERVICES_PREFIX}{service_name}/{instance_id}")
}

/// Leased key/value store operations used by the registry.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Store `value` under `key` with a TTL lease of `ttl`.
    ///
    /// The key must vanish from subsequent reads once `ttl` elapses without
    /// another `put` for the same key.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> VoyagerResult<()>;

    /// Return every key/value pair whose key starts with `prefix`.
    async fn get_prefix(&self, prefix: &str) -> VoyagerResult<BTreeMap<String, Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> VoyagerResult<()>;

    /// Liveness probe against the store.
    async fn status(&self) -> VoyagerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_key_layout() {
        assert_eq!(instance_key("order", "inst-1"), "/services/order/inst-1");
        assert!(instance_key("a", "b").starts_with(SERVICES_PREFIX));
    }
}
