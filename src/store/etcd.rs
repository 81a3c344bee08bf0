//! etcd-backed store adapter.
//!
//! Speaks the etcd v3 gRPC API using the wire subset in [`super::etcdpb`]
//! and a plain tonic channel; `put` grants a lease per write so the stored
//! key expires on its own when refreshes stop.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use super::etcdpb::{self, paths};
use super::KvStore;
use crate::core::error::{VoyagerError, VoyagerResult};

/// Dial timeout per endpoint attempt.
const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for an etcd cluster.
#[derive(Debug)]
pub struct EtcdStore {
    channel: Channel,
    endpoint: String,
}

impl EtcdStore {
    /// Connect to the first reachable endpoint.
    ///
    /// Every endpoint is tried in order with a bounded dial timeout; total
    /// failure surfaces as a Store error so the caller can fall back.
    pub async fn connect(endpoints: &[String]) -> VoyagerResult<Self> {
        if endpoints.is_empty() {
            return Err(VoyagerError::store("no etcd endpoints configured"));
        }

        let mut last_error = String::new();
        for endpoint in endpoints {
            let uri = normalize_endpoint(endpoint);
            let builder = match Endpoint::from_shared(uri.clone()) {
                Ok(b) => b.connect_timeout(DIAL_TIMEOUT),
                Err(e) => {
                    last_error = format!("{uri}: {e}");
                    continue;
                }
            };
            match builder.connect().await {
                Ok(channel) => {
                    tracing::debug!(endpoint = %uri, "connected to etcd");
                    return Ok(Self {
                        channel,
                        endpoint: uri,
                    });
                }
                Err(e) => {
                    tracing::debug!(endpoint = %uri, error = %e, "etcd dial failed");
                    last_error = format!("{uri}: {e}");
                }
            }
        }

        Err(VoyagerError::store(format!(
            "all etcd endpoints unreachable, last error: {last_error}"
        )))
    }

    /// The endpoint this store is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> VoyagerResult<Resp>
    where
        Req: Message + 'static,
        Resp: Message + Default + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| VoyagerError::store(format!("etcd channel not ready: {e}")))?;
        let codec = tonic::codec::ProstCodec::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await
            .map_err(|e| VoyagerError::store(format!("etcd rpc failed: {e}")))?;
        Ok(response.into_inner())
    }

    async fn grant_lease(&self, ttl: Duration) -> VoyagerResult<i64> {
        let request = etcdpb::LeaseGrantRequest {
            ttl: ttl.as_secs() as i64,
            id: 0,
        };
        let response: etcdpb::LeaseGrantResponse =
            self.unary(paths::LEASE_GRANT, request).await?;
        if !response.error.is_empty() {
            return Err(VoyagerError::store(format!(
                "lease grant rejected: {}",
                response.error
            )));
        }
        Ok(response.id)
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> VoyagerResult<()> {
        let lease = self.grant_lease(ttl).await?;
        let request = etcdpb::PutRequest {
            key: key.as_bytes().to_vec(),
            value: value.to_vec(),
            lease,
        };
        let _: etcdpb::PutResponse = self.unary(paths::PUT, request).await?;
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> VoyagerResult<BTreeMap<String, Vec<u8>>> {
        let request = etcdpb::RangeRequest {
            key: prefix.as_bytes().to_vec(),
            range_end: etcdpb::prefix_range_end(prefix.as_bytes()),
        };
        let response: etcdpb::RangeResponse = self.unary(paths::RANGE, request).await?;

        let mut result = BTreeMap::new();
        for kv in response.kvs {
            match String::from_utf8(kv.key) {
                Ok(key) => {
                    result.insert(key, kv.value);
                }
                Err(_) => {
                    tracing::warn!("skipping etcd key with non-utf8 bytes");
                }
            }
        }
        Ok(result)
    }

    async fn delete(&self, key: &str) -> VoyagerResult<()> {
        let request = etcdpb::DeleteRangeRequest {
            key: key.as_bytes().to_vec(),
            range_end: Vec::new(),
        };
        let _: etcdpb::DeleteRangeResponse = self.unary(paths::DELETE_RANGE, request).await?;
        Ok(())
    }

    async fn status(&self) -> VoyagerResult<()> {
        let _: etcdpb::StatusResponse = self
            .unary(paths::STATUS, etcdpb::StatusRequest::default())
            .await?;
        Ok(())
    }
}

/// Endpoints may arrive as `host:port`; tonic requires a scheme.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
