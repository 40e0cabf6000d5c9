//! Prometheus metrics and the HTTP endpoint that serves them.
//!
//! A single gauge tracks fulfilled leases per namespace and pool.

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Gauge name exported on `/metrics`
pub const LEASES_IN_USE: &str = "vsphere_capacity_manager_leases_in_use";

/// Lease usage metrics backed by a private registry.
#[derive(Clone)]
pub struct LeaseMetrics {
    registry: Registry,
    leases_in_use: IntGaugeVec,
}

impl std::fmt::Debug for LeaseMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseMetrics").finish_non_exhaustive()
    }
}

impl LeaseMetrics {
    /// Create the registry and register the lease gauge
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();
        let leases_in_use = IntGaugeVec::new(
            Opts::new(LEASES_IN_USE, "Number of fulfilled leases per namespace and pool"),
            &["namespace", "pool"],
        )?;
        registry.register(Box::new(leases_in_use.clone()))?;
        Ok(Self {
            registry,
            leases_in_use,
        })
    }

    /// Record a lease transitioning to Fulfilled
    pub fn lease_fulfilled(&self, namespace: &str, pool: &str) {
        self.leases_in_use.with_label_values(&[namespace, pool]).inc();
    }

    /// Retract a fulfilled lease that was released
    pub fn lease_released(&self, namespace: &str, pool: &str) {
        self.leases_in_use.with_label_values(&[namespace, pool]).dec();
    }

    /// Current gauge value for a namespace/pool pair
    #[cfg(test)]
    pub fn leases_in_use(&self, namespace: &str, pool: &str) -> i64 {
        self.leases_in_use.with_label_values(&[namespace, pool]).get()
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<String, ControllerError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ControllerError::Metrics(e.to_string()))
    }
}

async fn metrics_handler(State(metrics): State<Arc<LeaseMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Router exposing `/metrics` and `/healthz`
pub fn router(metrics: Arc<LeaseMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(metrics)
}

/// Serve the metrics router until the listener fails
pub async fn serve(addr: SocketAddr, metrics: Arc<LeaseMetrics>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Metrics(format!("failed to bind {addr}: {e}")))?;
    info!("Serving metrics on {}", addr);

    axum::serve(listener, router(metrics))
        .await
        .map_err(|e| ControllerError::Metrics(format!("metrics server error: {e}")))
}
