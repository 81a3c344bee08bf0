//! Store→view resync loop.
//!
//! Runs only in store-backed mode. Every half cache TTL the full
//! `/services/` prefix is re-read and the registry view swapped wholesale,
//! which bounds convergence after missed events without needing a watch.
//! Failures are counted and retried at the next interval, never fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::core::{build_service_map, Registry};
use crate::ops::observability::metrics;
use crate::store::{KvStore, SERVICES_PREFIX};

/// Deadline for one prefix read.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the refresh loop until shutdown.
pub async fn run(
    registry: Arc<Registry>,
    store: Arc<dyn KvStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let period = registry.cache_ttl() / 2;
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                refresh_once(&registry, store.as_ref()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("stopping cache refresher, server shutting down");
                    return;
                }
            }
        }
    }
}

/// One full resync: prefix read, rebuild, swap.
pub async fn refresh_once(registry: &Registry, store: &dyn KvStore) {
    let metrics_registry = registry.metrics();
    metrics_registry.counter_inc(metrics::CACHE_REFRESHES_TOTAL);

    let entries = match tokio::time::timeout(REFRESH_TIMEOUT, store.get_prefix(SERVICES_PREFIX))
        .await
    {
        Ok(Ok(entries)) => entries,
        Ok(Err(e)) => {
            metrics_registry.counter_inc(metrics::CACHE_REFRESH_ERRORS_TOTAL);
            tracing::warn!(error = %e, "failed to refresh cache");
            return;
        }
        Err(_) => {
            metrics_registry.counter_inc(metrics::CACHE_REFRESH_ERRORS_TOTAL);
            tracing::warn!("cache refresh timed out");
            return;
        }
    };

    let (services, skipped) = build_service_map(&entries);
    if skipped > 0 {
        metrics_registry.counter_inc(metrics::CACHE_REFRESH_ERRORS_TOTAL);
        tracing::warn!(skipped, "ignored unparseable registrations during refresh");
    }

    registry.replace_view(services);
}
