//! Instance selection strategies.
//!
//! A balancer sees a fresh instance list on every call and keeps only the
//! state its policy needs; all implementations are safe for concurrent use.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::options::BalancerStrategy;
use super::pool::ConnectionPool;
use crate::wire::Registration;

/// Picks one instance out of a candidate list.
pub trait LoadBalancer: Send + Sync {
    /// `None` when the list is empty.
    fn select(&self, service_name: &str, instances: &[Registration]) -> Option<Registration>;
}

/// Build the balancer for a strategy.
pub fn balancer_for(
    strategy: BalancerStrategy,
    pool: Arc<ConnectionPool>,
) -> Arc<dyn LoadBalancer> {
    match strategy {
        BalancerStrategy::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        BalancerStrategy::Random => Arc::new(RandomBalancer),
        BalancerStrategy::LeastConnections => Arc::new(LeastConnectionsBalancer::new(pool)),
    }
}

/// Sequential selection with a per-service cursor.
///
/// The cursor survives list changes and wraps modularly; no starvation
/// guarantee holds across list mutations.
pub struct RoundRobinBalancer {
    cursors: Mutex<HashMap<String, usize>>,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            cursors: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RoundRobinBalancer {
    fn select(&self, service_name: &str, instances: &[Registration]) -> Option<Registration> {
        if instances.is_empty() {
            return None;
        }
        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(service_name.to_string()).or_insert(0);
        let selected = instances[*cursor % instances.len()].clone();
        *cursor = (*cursor + 1) % instances.len();
        Some(selected)
    }
}

/// Uniform random selection.
pub struct RandomBalancer;

impl LoadBalancer for RandomBalancer {
    fn select(&self, _service_name: &str, instances: &[Registration]) -> Option<Registration> {
        if instances.is_empty() {
            return None;
        }
        Some(instances[fastrand::usize(..instances.len())].clone())
    }
}

/// Selects the instance with the fewest pooled connections.
///
/// Ties break by first-seen order in the candidate list.
pub struct LeastConnectionsBalancer {
    pool: Arc<ConnectionPool>,
}

impl LeastConnectionsBalancer {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl LoadBalancer for LeastConnectionsBalancer {
    fn select(&self, _service_name: &str, instances: &[Registration]) -> Option<Registration> {
        let mut selected: Option<&Registration> = None;
        let mut min_conns = i64::MAX;

        for instance in instances {
            let conns = self.pool.connection_count(&instance.endpoint());
            if conns < min_conns {
                min_conns = conns;
                selected = Some(instance);
            }
        }

        selected.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn instances(ids: &[&str]) -> Vec<Registration> {
        ids.iter()
            .map(|id| Registration {
                service_name: "svc".to_string(),
                instance_id: id.to_string(),
                address: id.to_string(),
                port: 80,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn round_robin_cycles_with_period_n() {
        let balancer = RoundRobinBalancer::new();
        let list = instances(&["h1", "h2", "h3"]);

        let picks: Vec<String> = (0..6)
            .map(|_| balancer.select("svc", &list).unwrap().instance_id)
            .collect();
        assert_eq!(picks, ["h1", "h2", "h3", "h1", "h2", "h3"]);
    }

    #[test]
    fn round_robin_tracks_cursor_per_service() {
        let balancer = RoundRobinBalancer::new();
        let list = instances(&["h1", "h2"]);

        assert_eq!(balancer.select("a", &list).unwrap().instance_id, "h1");
        assert_eq!(balancer.select("b", &list).unwrap().instance_id, "h1");
        assert_eq!(balancer.select("a", &list).unwrap().instance_id, "h2");
    }

    #[test]
    fn round_robin_survives_list_shrink() {
        let balancer = RoundRobinBalancer::new();
        let three = instances(&["h1", "h2", "h3"]);
        let one = instances(&["h1"]);

        balancer.select("svc", &three);
        balancer.select("svc", &three);
        // Cursor may exceed the new length; selection must still land inside.
        let pick = balancer.select("svc", &one).unwrap();
        assert_eq!(pick.instance_id, "h1");
    }

    #[test]
    fn empty_list_selects_nothing() {
        let pool = Arc::new(ConnectionPool::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
        ));
        assert!(RoundRobinBalancer::new().select("svc", &[]).is_none());
        assert!(RandomBalancer.select("svc", &[]).is_none());
        assert!(LeastConnectionsBalancer::new(pool).select("svc", &[]).is_none());
    }

    #[test]
    fn random_stays_in_set() {
        let balancer = RandomBalancer;
        let list = instances(&["h1", "h2", "h3"]);
        for _ in 0..50 {
            let pick = balancer.select("svc", &list).unwrap();
            assert!(list.iter().any(|i| i.instance_id == pick.instance_id));
        }
    }

    #[test]
    fn least_connections_breaks_ties_first_seen() {
        let pool = Arc::new(ConnectionPool::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
        ));
        let balancer = LeastConnectionsBalancer::new(pool);
        let list = instances(&["h1", "h2"]);
        // No pooled connections anywhere: all counts zero, first entry wins.
        assert_eq!(balancer.select("svc", &list).unwrap().instance_id, "h1");
    }
}
