//! Discovery protocol messages.
//!
//! Field numbers are part of the wire contract and must not be reassigned.
//! `Registration` doubles as the store value schema (JSON via serde), which
//! is why every message also derives serde.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single running service instance.
///
/// Re-registering the same `(service_name, instance_id)` replaces the prior
/// record and refreshes its lease.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
#[serde(default)]
pub struct Registration {
    /// Logical service name shared by interchangeable instances.
    #[prost(string, tag = "1")]
    pub service_name: String,

    /// Identifier unique within the service name, chosen by the instance.
    #[prost(string, tag = "2")]
    pub instance_id: String,

    /// Host or IP the instance is reachable at.
    #[prost(string, tag = "3")]
    pub address: String,

    /// TCP port; valid values fit in u16 and are non-zero.
    #[prost(int32, tag = "4")]
    pub port: i32,

    /// Opaque user metadata; the registry never inspects it.
    #[prost(map = "string, string", tag = "5")]
    pub metadata: HashMap<String, String>,
}

impl Registration {
    /// The `host:port` form used for dialing and pool keying.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Identifies one instance for Deregister.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
#[serde(default)]
pub struct InstanceId {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub instance_id: String,
}

/// Discover query.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
#[serde(default)]
pub struct ServiceQuery {
    #[prost(string, tag = "1")]
    pub service_name: String,
    /// Hint: only return instances believed live. In-memory registries always
    /// filter by freshness; store-backed registries rely on lease expiry.
    #[prost(bool, tag = "2")]
    pub healthy_only: bool,
}

/// Discover result: the current instance set for one service.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
#[serde(default)]
pub struct ServiceList {
    #[prost(message, repeated, tag = "1")]
    pub instances: Vec<Registration>,
}

/// HealthCheck request.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
#[serde(default)]
pub struct HealthRequest {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub instance_id: String,
}

/// HealthCheck result.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
#[serde(default)]
pub struct HealthResponse {
    #[prost(enumeration = "HealthStatus", tag = "1")]
    pub status: i32,
}

impl HealthResponse {
    /// Build a response from a typed status.
    pub fn with_status(status: HealthStatus) -> Self {
        Self {
            status: status as i32,
        }
    }
}

/// Instance health as reported by the registry.
///
/// `Unknown` is reserved in the contract; the server currently never emits it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    ::prost::Enumeration,
)]
#[repr(i32)]
pub enum HealthStatus {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

/// Outcome of Register/Deregister.
#[derive(Clone, PartialEq, Serialize, Deserialize, ::prost::Message)]
#[serde(default)]
pub struct Ack {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub error: String,
}

impl Ack {
    /// Successful acknowledgement.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn registration_roundtrip() {
        let mut metadata = HashMap::new();
        metadata.insert("env".to_string(), "prod".to_string());

        let reg = Registration {
            service_name: "order".to_string(),
            instance_id: "inst-1".to_string(),
            address: "10.0.0.1".to_string(),
            port: 8080,
            metadata,
        };

        let bytes = reg.encode_to_vec();
        let decoded = Registration::decode(bytes.as_slice()).expect("decode");
        assert_eq!(decoded, reg);
    }

    #[test]
    fn registration_json_field_names() {
        let reg = Registration {
            service_name: "pay".to_string(),
            instance_id: "p1".to_string(),
            address: "h".to_string(),
            port: 9000,
            metadata: HashMap::new(),
        };

        let json = serde_json::to_string(&reg).expect("serialize");
        assert!(json.contains("\"service_name\":\"pay\""));
        assert!(json.contains("\"instance_id\":\"p1\""));
        assert!(json.contains("\"port\":9000"));

        let back: Registration = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, reg);
    }

    #[test]
    fn registration_json_tolerates_missing_fields() {
        let back: Registration = serde_json::from_str("{\"service_name\":\"x\"}").expect("partial");
        assert_eq!(back.service_name, "x");
        assert_eq!(back.port, 0);
        assert!(back.metadata.is_empty());
    }

    #[test]
    fn health_status_mapping() {
        assert_eq!(
            HealthResponse::with_status(HealthStatus::Healthy).status(),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthResponse::with_status(HealthStatus::Unhealthy).status(),
            HealthStatus::Unhealthy
        );
        // Out-of-range values degrade to Unknown rather than failing.
        let resp = HealthResponse { status: 42 };
        assert_eq!(resp.status(), HealthStatus::Unknown);
    }

    #[test]
    fn endpoint_formatting() {
        let reg = Registration {
            address: "h1".to_string(),
            port: 80,
            ..Default::default()
        };
        assert_eq!(reg.endpoint(), "h1:80");
    }

    #[test]
    fn ack_defaults() {
        let ack = Ack::default();
        assert!(!ack.success);
        assert!(ack.error.is_empty());
        assert!(Ack::ok().success);
    }
}
