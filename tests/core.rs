//! Tests for configuration loading and runtime lifecycle.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use voyager::client::{ClientOptions, VoyagerClient};
use voyager::core::config::Config;
use voyager::core::runtime::Runtime;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn config_file_loads_with_defaults() {
    let file = write_config(
        r#"
cache_ttl_seconds = 5
auth_token = "secret"
grpc_addr = "127.0.0.1:0"
"#,
    );

    let config = Config::from_file(file.path()).expect("load");
    assert_eq!(config.cache_ttl(), Duration::from_secs(5));
    assert_eq!(config.auth_token, "secret");
    assert_eq!(config.grpc_addr, "127.0.0.1:0");
    // Untouched fields keep their defaults.
    assert_eq!(config.metrics_addr, ":2112");
    assert!(config.is_in_memory());
}

#[test]
fn config_rejects_malformed_file() {
    let file = write_config("cache_ttl_seconds = \"not a number\"");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn missing_config_file_means_defaults() {
    let path = std::path::Path::new("/nonexistent/voyager-test.toml");
    let config = Config::load_or_default(path).expect("defaults");
    assert_eq!(config.cache_ttl_seconds, 30);
}

#[tokio::test]
async fn runtime_serves_discovery_and_metrics() {
    let config = Config {
        grpc_addr: "127.0.0.1:0".to_string(),
        metrics_addr: "127.0.0.1:0".to_string(),
        cache_ttl_seconds: 60,
        ..Default::default()
    };

    let mut runtime = Runtime::new(config).await.expect("construct runtime");
    let grpc_addr = runtime.grpc_addr();
    let metrics_addr = runtime.metrics_addr();
    runtime.start().await.expect("start runtime");

    // Discovery round trip through the running server.
    let client = VoyagerClient::connect(
        &grpc_addr.to_string(),
        ClientOptions::default()
            .retry_policy(3, Duration::from_millis(20))
            .instance_id("rt-1"),
    )
    .await
    .expect("connect client");
    client
        .register("order", "10.0.0.1", 8080, HashMap::new())
        .await
        .expect("register");
    assert_eq!(runtime.registry().discover("order", true).len(), 1);

    // Metrics endpoint answers over plain HTTP.
    let mut stream = tokio::net::TcpStream::connect(metrics_addr)
        .await
        .expect("connect metrics");
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
        .await
        .expect("request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("voyager_registrations_total{service=\"order\"} 1"));

    client.close();
    runtime.stop().await.expect("stop runtime");
}

#[tokio::test]
async fn runtime_rejects_invalid_config() {
    let config = Config {
        cache_ttl_seconds: 0,
        ..Default::default()
    };
    assert!(Runtime::new(config).await.is_err());
}

#[tokio::test]
async fn runtime_bind_conflict_is_a_construction_error() {
    let first = Config {
        grpc_addr: "127.0.0.1:0".to_string(),
        metrics_addr: "127.0.0.1:0".to_string(),
        ..Default::default()
    };
    let runtime = Runtime::new(first).await.expect("first runtime");

    // Second runtime on the same gRPC port must fail to construct.
    let second = Config {
        grpc_addr: runtime.grpc_addr().to_string(),
        metrics_addr: "127.0.0.1:0".to_string(),
        ..Default::default()
    };
    assert!(Runtime::new(second).await.is_err());
}
