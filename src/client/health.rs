//! Client-side health-check loop.
//!
//! Keeps this process's registration alive: each tick sends a bounded
//! HealthCheck, and any failure (RPC error or an Unhealthy verdict)
//! triggers re-registration with the remembered name, address, port and
//! metadata. The loop is started at most once per client and stops
//! cooperatively through a watch channel; an in-flight RPC is bounded by
//! its own deadline.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tonic::transport::Channel;

use super::{with_auth, RegistrationState, RPC_TIMEOUT};
use crate::wire::{DiscoveryClient, HealthRequest, HealthStatus, Registration};

/// Everything the loop needs, detached from the client.
pub(crate) struct HealthLoop {
    pub rpc: DiscoveryClient<Channel>,
    pub registration: Arc<Mutex<Option<RegistrationState>>>,
    pub auth_token: Option<String>,
    pub interval: Duration,
}

/// Run ticks until the shutdown channel flips.
pub(crate) async fn run(ctx: HealthLoop, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately; consume it so
    // the loop starts one interval after registration.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick(&ctx).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("health checks stopped");
                    return;
                }
            }
        }
    }
}

async fn tick(ctx: &HealthLoop) {
    let Some(state) = ctx.registration.lock().clone() else {
        return;
    };

    let request = HealthRequest {
        service_name: state.service_name.clone(),
        instance_id: state.instance_id.clone(),
    };
    let request = match with_auth(request, &ctx.auth_token) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "cannot build health check request");
            return;
        }
    };

    let mut rpc = ctx.rpc.clone();
    let verdict = tokio::time::timeout(RPC_TIMEOUT, rpc.health_check(request)).await;

    let healthy = match verdict {
        Ok(Ok(response)) => response.into_inner().status() == HealthStatus::Healthy,
        Ok(Err(status)) => {
            tracing::warn!(
                service = %state.service_name,
                instance = %state.instance_id,
                error = %status,
                "health check failed"
            );
            false
        }
        Err(_) => {
            tracing::warn!(
                service = %state.service_name,
                instance = %state.instance_id,
                "health check timed out"
            );
            false
        }
    };

    if !healthy {
        reregister(ctx, &state).await;
    }
}

/// Repeat Register with the remembered registration, metadata included.
async fn reregister(ctx: &HealthLoop, state: &RegistrationState) {
    tracing::info!(
        service = %state.service_name,
        instance = %state.instance_id,
        "attempting to re-register"
    );

    let registration = Registration {
        service_name: state.service_name.clone(),
        instance_id: state.instance_id.clone(),
        address: state.address.clone(),
        port: state.port as i32,
        metadata: state.metadata.clone(),
    };
    let request = match with_auth(registration, &ctx.auth_token) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "cannot build re-register request");
            return;
        }
    };

    let mut rpc = ctx.rpc.clone();
    match tokio::time::timeout(RPC_TIMEOUT, rpc.register(request)).await {
        Ok(Ok(response)) if response.get_ref().success => {
            tracing::info!(service = %state.service_name, "re-registered successfully");
        }
        Ok(Ok(response)) => {
            tracing::warn!(
                service = %state.service_name,
                error = %response.get_ref().error,
                "re-registration rejected"
            );
        }
        Ok(Err(status)) => {
            tracing::warn!(service = %state.service_name, error = %status, "re-registration failed");
        }
        Err(_) => {
            tracing::warn!(service = %state.service_name, "re-registration timed out");
        }
    }
}
