//! Discovery wire protocol.
//!
//! Four unary operations over gRPC, service `voyager.v1.Discovery`:
//!
//! | Method      | Request         | Response         |
//! |-------------|-----------------|------------------|
//! | Register    | [`Registration`]| [`Ack`]          |
//! | Deregister  | [`InstanceId`]  | [`Ack`]          |
//! | Discover    | [`ServiceQuery`]| [`ServiceList`]  |
//! | HealthCheck | [`HealthRequest`]| [`HealthResponse`] |
//!
//! The message types are hand-written prost structs (no build-time codegen,
//! see `build.rs`) that also derive serde: the same [`Registration`] record
//! is stored as JSON under the registry's store keys, so wire schema and
//! store schema cannot drift apart.

pub mod client;
pub mod messages;
pub mod server;

pub use client::DiscoveryClient;
pub use messages::{
    Ack, HealthRequest, HealthResponse, HealthStatus, InstanceId, Registration, ServiceList,
    ServiceQuery,
};
pub use server::{Discovery, DiscoveryServer};

/// Fully qualified gRPC service name.
pub const SERVICE_NAME: &str = "voyager.v1.Discovery";
