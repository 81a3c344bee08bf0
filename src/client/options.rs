//! Client configuration.

use std::time::Duration;

/// Instance selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancerStrategy {
    /// Per-service cursor, sequential order.
    #[default]
    RoundRobin,
    /// Uniform random choice.
    Random,
    /// Fewest pooled connections wins.
    LeastConnections,
}

/// Options for [`VoyagerClient`](super::VoyagerClient).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Discovery cache horizon; zero disables caching.
    pub cache_ttl: Duration,
    /// Instance selection strategy.
    pub balancer: BalancerStrategy,
    /// Dial timeout for the control channel and pooled connections.
    pub connection_timeout: Duration,
    /// Dial attempts at construction.
    pub max_retries: u32,
    /// Pause between dial attempts.
    pub retry_delay: Duration,
    /// Health-check period; zero derives `cache_ttl / 3`, clamped to >= 5 s.
    pub health_check_interval: Duration,
    /// Idle-connection reclaim period.
    pub monitor_interval: Duration,
    /// Bearer token attached to every control RPC.
    pub auth_token: Option<String>,
    /// Preset instance id; generated from the hostname when unset.
    pub instance_id: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            balancer: BalancerStrategy::RoundRobin,
            connection_timeout: Duration::from_secs(5),
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
            health_check_interval: Duration::ZERO,
            monitor_interval: Duration::from_secs(30),
            auth_token: None,
            instance_id: None,
        }
    }
}

impl ClientOptions {
    /// Set the discovery cache TTL; zero disables caching.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the load balancing strategy.
    #[must_use]
    pub fn balancer(mut self, strategy: BalancerStrategy) -> Self {
        self.balancer = strategy;
        self
    }

    /// Set the dial timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the construction retry policy.
    #[must_use]
    pub fn retry_policy(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    /// Set the health-check interval; zero derives it from the cache TTL.
    #[must_use]
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Set the idle-connection reclaim period.
    #[must_use]
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Attach a bearer token to every control RPC.
    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Pin the instance id instead of generating one.
    #[must_use]
    pub fn instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    /// The effective health-check period for a given cache TTL.
    pub fn effective_health_interval(&self, cache_ttl: Duration) -> Duration {
        if !self.health_check_interval.is_zero() {
            return self.health_check_interval;
        }
        let derived = cache_ttl / 3;
        if derived < Duration::from_secs(5) {
            Duration::from_secs(5)
        } else {
            derived
        }
    }
}
