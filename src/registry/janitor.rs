//! In-memory expiry sweeper.
//!
//! Runs only in in-memory mode, where no store lease exists to expire dead
//! registrations. Every half cache TTL it removes instances whose last
//! health report is older than the TTL. The period is re-read each tick so
//! a TTL shrunk by the test hook takes effect immediately.

use std::sync::Arc;

use tokio::sync::watch;

use super::core::Registry;

/// Run the sweep loop until shutdown.
pub async fn run(registry: Arc<Registry>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let period = registry.cache_ttl() / 2;
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                let removed = registry.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "janitor sweep");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("stopping janitor, server shutting down");
                    return;
                }
            }
        }
    }
}
