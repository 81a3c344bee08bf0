//! Tests for the discovery client: pool, balancing, cache and health loop.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::{spawn_server, test_registration};
use voyager::client::{BalancerStrategy, ClientOptions, ConnectionPool, VoyagerClient};
use voyager::core::error::VoyagerError;
use voyager::ops::observability::metrics;

fn fast_options() -> ClientOptions {
    ClientOptions::default()
        .retry_policy(3, Duration::from_millis(20))
        .connection_timeout(Duration::from_millis(500))
}

// ============================================================================
// Connection Pool
// ============================================================================

#[tokio::test]
async fn pool_reuses_connection_and_counts_references() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let pool = Arc::new(ConnectionPool::new(
        Duration::from_millis(500),
        Duration::from_secs(30),
    ));

    let _conn1 = pool.get(&server.addr).await.expect("first get");
    let _conn2 = pool.get(&server.addr).await.expect("second get");
    assert_eq!(pool.connection_count(&server.addr), 2);

    pool.release(&server.addr);
    pool.release(&server.addr);
    assert_eq!(pool.connection_count(&server.addr), 0);
    // Entry remains pooled until the monitor reclaims it.
    assert!(pool.contains(&server.addr));

    server.stop().await;
}

#[tokio::test]
async fn pool_concurrent_gets_share_one_connection() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let pool = Arc::new(ConnectionPool::new(
        Duration::from_millis(500),
        Duration::from_secs(30),
    ));

    let (a, b) = tokio::join!(pool.get(&server.addr), pool.get(&server.addr));
    a.expect("concurrent get a");
    b.expect("concurrent get b");
    assert_eq!(pool.connection_count(&server.addr), 2);

    server.stop().await;
}

#[tokio::test]
async fn pool_monitor_reclaims_idle_connection() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let pool = Arc::new(ConnectionPool::new(
        Duration::from_millis(500),
        Duration::from_millis(50),
    ));

    let _conn = pool.get(&server.addr).await.expect("get");
    pool.release(&server.addr);
    assert_eq!(pool.connection_count(&server.addr), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!pool.contains(&server.addr), "monitor should reclaim idle entry");

    // A later get dials a fresh connection.
    let _conn = pool.get(&server.addr).await.expect("re-dial");
    assert_eq!(pool.connection_count(&server.addr), 1);

    server.stop().await;
}

#[tokio::test]
async fn pool_close_empties_the_map() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let pool = Arc::new(ConnectionPool::new(
        Duration::from_millis(500),
        Duration::from_secs(30),
    ));

    let _conn = pool.get(&server.addr).await.expect("get");
    pool.close();
    assert!(!pool.contains(&server.addr));
    assert_eq!(pool.connection_count(&server.addr), 0);

    // Get after close dials fresh rather than returning a closed entry.
    let _conn = pool.get(&server.addr).await.expect("get after close");
    assert_eq!(pool.connection_count(&server.addr), 1);

    server.stop().await;
}

// ============================================================================
// Client Registration
// ============================================================================

#[tokio::test]
async fn register_validates_before_sending() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let client = VoyagerClient::connect(&server.addr, fast_options())
        .await
        .expect("connect");

    for (name, addr, port) in [("", "h", 80u16), ("svc", "", 80), ("svc", "h", 0)] {
        let err = client
            .register(name, addr, port, HashMap::new())
            .await
            .expect_err("must reject");
        assert!(matches!(err, VoyagerError::InvalidArgument { .. }));
    }
    assert!(!client.health_loop_running());

    server.stop().await;
}

#[tokio::test]
async fn register_generates_instance_id_and_starts_health_loop() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let client = VoyagerClient::connect(&server.addr, fast_options())
        .await
        .expect("connect");

    client
        .register("order", "10.0.0.1", 8080, HashMap::new())
        .await
        .expect("register");

    let instance_id = client.instance_id().expect("generated");
    assert!(instance_id.contains('-'));
    assert!(client.health_loop_running());

    let instances = server.registry.discover("order", true);
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].instance_id, instance_id);

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn register_with_auth_token() {
    let server = spawn_server("T", Duration::from_secs(60)).await;

    let authorized = VoyagerClient::connect(&server.addr, fast_options().auth_token("T"))
        .await
        .expect("connect");
    authorized
        .register("order", "10.0.0.1", 8080, HashMap::new())
        .await
        .expect("authorized register");

    let unauthorized = VoyagerClient::connect(&server.addr, fast_options().auth_token("X"))
        .await
        .expect("connect");
    let err = unauthorized
        .register("order", "10.0.0.1", 8080, HashMap::new())
        .await
        .expect_err("wrong token");
    assert!(matches!(err, VoyagerError::Rpc(_)));

    authorized.close();
    unauthorized.close();
    server.stop().await;
}

#[tokio::test]
async fn deregister_requires_prior_registration() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let client = VoyagerClient::connect(&server.addr, fast_options())
        .await
        .expect("connect");

    let err = client.deregister().await.expect_err("never registered");
    assert!(matches!(err, VoyagerError::InvalidArgument { .. }));

    server.stop().await;
}

#[tokio::test]
async fn deregister_removes_registration_and_stops_health_loop() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let client = VoyagerClient::connect(&server.addr, fast_options().instance_id("fixed-1"))
        .await
        .expect("connect");

    client
        .register("order", "10.0.0.1", 8080, HashMap::new())
        .await
        .expect("register");
    assert!(client.health_loop_running());

    client.deregister().await.expect("deregister");
    assert!(!client.health_loop_running());
    assert!(server.registry.discover("order", true).is_empty());

    server.stop().await;
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn discover_returns_pooled_connection() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    // Register an instance that points at the discovery server itself, so
    // the pool has a real endpoint to dial.
    server
        .registry
        .register(test_registration("echo", "e1", "127.0.0.1", addr_port(&server.addr)))
        .await
        .expect("seed instance");

    let client = VoyagerClient::connect(&server.addr, fast_options())
        .await
        .expect("connect");

    let _conn = client.discover("echo").await.expect("discover");
    let endpoint = format!("127.0.0.1:{}", addr_port(&server.addr));
    assert_eq!(client.pool().connection_count(&endpoint), 1);

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn discover_with_no_instances_fails() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let client = VoyagerClient::connect(&server.addr, fast_options())
        .await
        .expect("connect");

    let err = client.discover("missing").await.expect_err("no instances");
    assert!(matches!(err, VoyagerError::NoInstances { .. }));

    server.stop().await;
}

#[tokio::test]
async fn discovery_cache_absorbs_repeat_lookups() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    server
        .registry
        .register(test_registration("echo", "e1", "127.0.0.1", addr_port(&server.addr)))
        .await
        .expect("seed instance");

    let client = VoyagerClient::connect(&server.addr, fast_options())
        .await
        .expect("connect");

    let _ = client.discover("echo").await.expect("first discover");
    let _ = client.discover("echo").await.expect("second discover");

    // Only the first lookup reached the server; the second hit the cache.
    let lookups = server.registry.metrics().counter_get_with(
        metrics::DISCOVERIES_TOTAL,
        &[("service", "echo"), ("status", "success")],
    );
    assert_eq!(lookups, 1);

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn round_robin_cycles_across_instances() {
    // Three real backends plus the discovery server in front of them.
    let backend1 = spawn_server("", Duration::from_secs(60)).await;
    let backend2 = spawn_server("", Duration::from_secs(60)).await;
    let backend3 = spawn_server("", Duration::from_secs(60)).await;
    let discovery = spawn_server("", Duration::from_secs(60)).await;

    for (id, backend) in [("b1", &backend1), ("b2", &backend2), ("b3", &backend3)] {
        discovery
            .registry
            .register(test_registration("worker", id, "127.0.0.1", addr_port(&backend.addr)))
            .await
            .expect("seed instance");
    }

    // Cache disabled so every discover consults the balancer afresh.
    let client = VoyagerClient::connect(
        &discovery.addr,
        fast_options()
            .cache_ttl(Duration::ZERO)
            .balancer(BalancerStrategy::RoundRobin),
    )
    .await
    .expect("connect");

    // Instance lists come back ordered by id (b1, b2, b3), so the cursor
    // walks the backends in that exact order.
    let expected = [&backend1, &backend2, &backend3, &backend1];
    for (i, backend) in expected.iter().enumerate() {
        let _ = client.discover("worker").await.expect("discover");
        assert_eq!(
            client.pool().connection_count(&backend.addr),
            if i == 3 { 2 } else { 1 },
            "unexpected refcount after discover #{}",
            i + 1
        );
    }

    client.close();
    discovery.stop().await;
    backend1.stop().await;
    backend2.stop().await;
    backend3.stop().await;
}

// ============================================================================
// Health Loop Recovery
// ============================================================================

#[tokio::test]
async fn health_loop_reregisters_after_eviction() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let client = VoyagerClient::connect(
        &server.addr,
        fast_options()
            .health_check_interval(Duration::from_millis(80))
            .instance_id("inst-1"),
    )
    .await
    .expect("connect");

    let mut metadata = HashMap::new();
    metadata.insert("env".to_string(), "prod".to_string());
    client
        .register("order", "10.0.0.1", 8080, metadata)
        .await
        .expect("register");

    // Simulate server-side loss of the registration.
    server
        .registry
        .deregister("order", "inst-1")
        .await
        .expect("evict");
    assert!(server.registry.discover("order", true).is_empty());

    // Within a few intervals the failing health check triggers re-register.
    let mut recovered = Vec::new();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        recovered = server.registry.discover("order", true);
        if !recovered.is_empty() {
            break;
        }
    }
    assert_eq!(recovered.len(), 1, "health loop should have re-registered");
    assert_eq!(recovered[0].instance_id, "inst-1");
    // Original metadata is preserved across re-registration.
    assert_eq!(recovered[0].metadata.get("env").map(String::as_str), Some("prod"));

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn close_is_idempotent_and_stops_health_loop() {
    let server = spawn_server("", Duration::from_secs(60)).await;
    let client = VoyagerClient::connect(&server.addr, fast_options())
        .await
        .expect("connect");

    client
        .register("order", "10.0.0.1", 8080, HashMap::new())
        .await
        .expect("register");
    assert!(client.health_loop_running());

    client.close();
    assert!(!client.health_loop_running());
    client.close();

    server.stop().await;
}

fn addr_port(addr: &str) -> i32 {
    addr.rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .expect("test server address has a port")
}
