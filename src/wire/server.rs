//! Hand-written gRPC server glue for the discovery service.
//!
//! [`DiscoveryServer`] is a tower service dispatching on the request path,
//! written in the shape tonic codegen emits so no protobuf toolchain is
//! needed at build time. Handlers implement the [`Discovery`] trait;
//! middleware (the auth gate) wraps the whole server via
//! [`DiscoveryServer::with_interceptor`], never individual handlers.

use std::task::{Context, Poll};

use tonic::codegen::*;

use super::messages::{
    Ack, HealthRequest, HealthResponse, InstanceId, Registration, ServiceList, ServiceQuery,
};

/// Server-side handler for the four discovery operations.
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    async fn register(
        &self,
        request: tonic::Request<Registration>,
    ) -> Result<tonic::Response<Ack>, tonic::Status>;

    async fn deregister(
        &self,
        request: tonic::Request<InstanceId>,
    ) -> Result<tonic::Response<Ack>, tonic::Status>;

    async fn discover(
        &self,
        request: tonic::Request<ServiceQuery>,
    ) -> Result<tonic::Response<ServiceList>, tonic::Status>;

    async fn health_check(
        &self,
        request: tonic::Request<HealthRequest>,
    ) -> Result<tonic::Response<HealthResponse>, tonic::Status>;
}

/// Tower service exposing a [`Discovery`] implementation over gRPC.
#[derive(Debug)]
pub struct DiscoveryServer<T> {
    inner: Arc<T>,
}

impl<T> DiscoveryServer<T> {
    pub fn new(inner: T) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<T>) -> Self {
        Self { inner }
    }

    /// Wrap the server with a request interceptor (auth gate).
    pub fn with_interceptor<F>(inner: T, interceptor: F) -> InterceptedService<Self, F>
    where
        F: tonic::service::Interceptor,
    {
        InterceptedService::new(Self::new(inner), interceptor)
    }
}

impl<T> Clone for DiscoveryServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, B> Service<http::Request<B>> for DiscoveryServer<T>
where
    T: Discovery,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            "/voyager.v1.Discovery/Register" => {
                struct RegisterSvc<T: Discovery>(Arc<T>);
                impl<T: Discovery> tonic::server::UnaryService<Registration> for RegisterSvc<T> {
                    type Response = Ack;
                    type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                    fn call(&mut self, request: tonic::Request<Registration>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.register(request).await })
                    }
                }
                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let method = RegisterSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(method, req).await)
                })
            }
            "/voyager.v1.Discovery/Deregister" => {
                struct DeregisterSvc<T: Discovery>(Arc<T>);
                impl<T: Discovery> tonic::server::UnaryService<InstanceId> for DeregisterSvc<T> {
                    type Response = Ack;
                    type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                    fn call(&mut self, request: tonic::Request<InstanceId>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.deregister(request).await })
                    }
                }
                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let method = DeregisterSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(method, req).await)
                })
            }
            "/voyager.v1.Discovery/Discover" => {
                struct DiscoverSvc<T: Discovery>(Arc<T>);
                impl<T: Discovery> tonic::server::UnaryService<ServiceQuery> for DiscoverSvc<T> {
                    type Response = ServiceList;
                    type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                    fn call(&mut self, request: tonic::Request<ServiceQuery>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.discover(request).await })
                    }
                }
                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let method = DiscoverSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(method, req).await)
                })
            }
            "/voyager.v1.Discovery/HealthCheck" => {
                struct HealthCheckSvc<T: Discovery>(Arc<T>);
                impl<T: Discovery> tonic::server::UnaryService<HealthRequest> for HealthCheckSvc<T> {
                    type Response = HealthResponse;
                    type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                    fn call(&mut self, request: tonic::Request<HealthRequest>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.health_check(request).await })
                    }
                }
                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let method = HealthCheckSvc(inner);
                    let codec = tonic::codec::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(method, req).await)
                })
            }
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", (tonic::Code::Unimplemented as i32).to_string())
                    .header("content-type", "application/grpc")
                    .body(empty_body())
                    .unwrap())
            }),
        }
    }
}

impl<T: Discovery> tonic::server::NamedService for DiscoveryServer<T> {
    const NAME: &'static str = super::SERVICE_NAME;
}
