//! Hand-written gRPC client for the discovery service.
//!
//! Mirrors the shape tonic's codegen would produce so that no build-time
//! protobuf toolchain is required. Every method is unary; the caller is
//! responsible for deadlines (see the discovery client's RPC wrappers).

use bytes::Bytes;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::codegen::*;

use super::messages::{
    Ack, HealthRequest, HealthResponse, InstanceId, Registration, ServiceList, ServiceQuery,
};

/// Thin unary client over any gRPC-capable transport.
#[derive(Debug, Clone)]
pub struct DiscoveryClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl DiscoveryClient<tonic::transport::Channel> {
    /// Connect to the discovery service at `dst`.
    pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
    where
        D: TryInto<tonic::transport::Endpoint>,
        D::Error: Into<StdError>,
    {
        let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
        Ok(Self::new(conn))
    }
}

impl<T> DiscoveryClient<T>
where
    T: tonic::client::GrpcService<tonic::body::BoxBody>,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    pub fn new(inner: T) -> Self {
        let inner = tonic::client::Grpc::new(inner);
        Self { inner }
    }

    pub async fn register(
        &mut self,
        request: impl tonic::IntoRequest<Registration>,
    ) -> Result<tonic::Response<Ack>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/voyager.v1.Discovery/Register");
        self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn deregister(
        &mut self,
        request: impl tonic::IntoRequest<InstanceId>,
    ) -> Result<tonic::Response<Ack>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/voyager.v1.Discovery/Deregister");
        self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn discover(
        &mut self,
        request: impl tonic::IntoRequest<ServiceQuery>,
    ) -> Result<tonic::Response<ServiceList>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/voyager.v1.Discovery/Discover");
        self.inner.unary(request.into_request(), path, codec).await
    }

    pub async fn health_check(
        &mut self,
        request: impl tonic::IntoRequest<HealthRequest>,
    ) -> Result<tonic::Response<HealthResponse>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static("/voyager.v1.Discovery/HealthCheck");
        self.inner.unary(request.into_request(), path, codec).await
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner.ready().await.map_err(|e| {
            tonic::Status::unknown(format!("service was not ready: {}", e.into()))
        })
    }
}
