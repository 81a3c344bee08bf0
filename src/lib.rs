//! Voyager - service-discovery control plane for microservice fleets.
//!
//! Service instances register themselves with a logical name, address and
//! metadata; other instances query by name and receive the current set of
//! live addresses to route RPCs through. The registry survives restarts via
//! an external strongly-consistent leased store (etcd) and degrades to a
//! purely in-memory mode when that store is unavailable.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Discovery Client                          │
//! │  health loop │ discovery cache │ load balancer │ conn pool      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │ gRPC (voyager.v1.Discovery)
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Registry Server                           │
//! │   auth gate │ service map │ refresher / janitor │ metrics       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │ put-with-lease / prefix-get
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                External KV Store (etcd, optional)               │
//! │           TTL leases are the source of truth for liveness       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Main runtime orchestration
//! - [`core::error`] - Error types and gRPC status mapping
//!
//! ## Registry Server
//! - [`registry::core`] - Authoritative service map, dual backend
//! - [`registry::service`] - gRPC handler and auth gate
//! - [`registry::refresher`] - Store→view resync loop
//! - [`registry::janitor`] - In-memory expiry sweeper
//!
//! ## Discovery Client
//! - [`client`] - Register/Discover/Deregister entry point
//! - [`client::health`] - Health-check loop with re-register recovery
//! - [`client::balancer`] - Round-robin, random, least-connections
//! - [`client::pool`] - Reference-counted connection pool
//!
//! ## Store
//! - [`store`] - Leased KV abstraction and etcd adapter
//!
//! ## Wire
//! - [`wire`] - Discovery protocol messages, client and server glue
//!
//! ## Operations
//! - [`ops::observability`] - Metrics registry and HTTP endpoint
//!
//! # Key Invariants
//!
//! - Registrations expire without refresh: store leases in store-backed
//!   mode, the janitor sweep in in-memory mode
//! - Discovery never blocks on the external store
//! - The backend mode is decided once, at construction
//! - At most one live pooled connection per address; closed exactly once

// Core infrastructure
pub mod core;

// Registry server
pub mod registry;

// Discovery client
pub mod client;

// External store
pub mod store;

// Wire protocol
pub mod wire;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use client::{ClientOptions, VoyagerClient};
pub use registry::{connect_registry, Registry};
pub use store::KvStore;
pub use wire::Registration;
