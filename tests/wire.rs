//! Tests for the wire message schemas.

use std::collections::HashMap;

use prost::Message;
use voyager::wire::{Ack, HealthStatus, Registration, ServiceList, ServiceQuery};

#[test]
fn service_list_prost_roundtrip() {
    let list = ServiceList {
        instances: vec![
            Registration {
                service_name: "order".to_string(),
                instance_id: "i1".to_string(),
                address: "h1".to_string(),
                port: 80,
                metadata: HashMap::new(),
            },
            Registration {
                service_name: "order".to_string(),
                instance_id: "i2".to_string(),
                address: "h2".to_string(),
                port: 81,
                metadata: HashMap::from([("env".to_string(), "prod".to_string())]),
            },
        ],
    };

    let decoded = ServiceList::decode(list.encode_to_vec().as_slice()).expect("decode");
    assert_eq!(decoded, list);
}

#[test]
fn service_query_defaults_decode_as_empty() {
    // An empty buffer is a valid proto3 message with default fields.
    let query = ServiceQuery::decode(&[][..]).expect("decode empty");
    assert!(query.service_name.is_empty());
    assert!(!query.healthy_only);
}

#[test]
fn registration_store_value_matches_external_writers() {
    // The store value schema must accept records written by other
    // implementations: snake_case keys, missing optional fields.
    let payload = r#"{
        "service_name": "pay",
        "instance_id": "p1",
        "address": "10.2.0.7",
        "port": 9000,
        "metadata": {"env": "prod", "zone": "b"}
    }"#;
    let reg: Registration = serde_json::from_str(payload).expect("deserialize");
    assert_eq!(reg.service_name, "pay");
    assert_eq!(reg.port, 9000);
    assert_eq!(reg.metadata.len(), 2);

    let minimal = r#"{"service_name": "pay", "instance_id": "p1", "address": "h", "port": 1}"#;
    let reg: Registration = serde_json::from_str(minimal).expect("deserialize minimal");
    assert!(reg.metadata.is_empty());
}

#[test]
fn health_status_wire_values_are_stable() {
    assert_eq!(HealthStatus::Unknown as i32, 0);
    assert_eq!(HealthStatus::Healthy as i32, 1);
    assert_eq!(HealthStatus::Unhealthy as i32, 2);
}

#[test]
fn ack_error_text_survives_roundtrip() {
    let ack = Ack {
        success: false,
        error: "registration failed".to_string(),
    };
    let decoded = Ack::decode(ack.encode_to_vec().as_slice()).expect("decode");
    assert_eq!(decoded, ack);
}
