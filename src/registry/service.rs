//! gRPC handler and auth gate.
//!
//! [`DiscoveryService`] adapts the registry to the wire trait; it contains
//! no business rules of its own. [`AuthGate`] is the per-request credential
//! check, applied uniformly around the whole server as an interceptor;
//! individual handlers never re-check credentials.

use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{Request, Response, Status};

use super::Registry;
use crate::wire::{
    Ack, Discovery, HealthRequest, HealthResponse, InstanceId, Registration, ServiceList,
    ServiceQuery,
};

/// Metadata key carrying the bearer token.
pub const AUTHORIZATION_KEY: &str = "authorization";

/// gRPC surface over a [`Registry`].
pub struct DiscoveryService {
    registry: Arc<Registry>,
}

impl DiscoveryService {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl Discovery for DiscoveryService {
    async fn register(
        &self,
        request: Request<Registration>,
    ) -> Result<Response<Ack>, Status> {
        let registration = request.into_inner();
        tracing::info!(
            service = %registration.service_name,
            instance = %registration.instance_id,
            endpoint = %registration.endpoint(),
            "register"
        );

        self.registry.register(registration).await?;
        Ok(Response::new(Ack::ok()))
    }

    async fn deregister(
        &self,
        request: Request<InstanceId>,
    ) -> Result<Response<Ack>, Status> {
        let id = request.into_inner();
        tracing::info!(service = %id.service_name, instance = %id.instance_id, "deregister");

        self.registry
            .deregister(&id.service_name, &id.instance_id)
            .await?;
        Ok(Response::new(Ack::ok()))
    }

    async fn discover(
        &self,
        request: Request<ServiceQuery>,
    ) -> Result<Response<ServiceList>, Status> {
        let query = request.into_inner();
        tracing::debug!(service = %query.service_name, healthy_only = query.healthy_only, "discover");

        let instances = self
            .registry
            .discover(&query.service_name, query.healthy_only);
        Ok(Response::new(ServiceList { instances }))
    }

    async fn health_check(
        &self,
        request: Request<HealthRequest>,
    ) -> Result<Response<HealthResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(service = %req.service_name, instance = %req.instance_id, "health check");

        let status = self
            .registry
            .health_check(&req.service_name, &req.instance_id)
            .await;
        Ok(Response::new(HealthResponse::with_status(status)))
    }
}

/// Shared-token credential check.
///
/// With no token configured the gate passes everything through. Otherwise:
/// a missing `authorization` header is `Unauthenticated`, a mismatched one
/// is `PermissionDenied`.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    token: Option<String>,
}

impl AuthGate {
    /// Build a gate; an empty token disables the check.
    pub fn new(token: &str) -> Self {
        Self {
            token: if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            },
        }
    }
}

impl Interceptor for AuthGate {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        let Some(expected) = &self.token else {
            return Ok(request);
        };

        match request.metadata().get(AUTHORIZATION_KEY) {
            None => Err(Status::unauthenticated("missing credentials")),
            Some(value) if value.as_bytes() == expected.as_bytes() => Ok(request),
            Some(_) => Err(Status::permission_denied("invalid auth token")),
        }
    }
}
