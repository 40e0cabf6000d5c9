//! Lease Controller
//!
//! Allocates vSphere capacity to CI jobs:
//! - Lease: a job's request for vCPU, memory and network segments
//! - Pool: a failure domain whose capacity is handed out
//! - Network: a port group leased exclusively to one job
//!
//! Leases are admitted first come, first served per pool and tenancy type.
//! Usage is exported as a Prometheus gauge on `/metrics`.

mod backoff;
mod config;
mod controller;
mod env_vars;
mod error;
mod metrics;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use anyhow::Result;
use config::ControllerConfig;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Lease Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Multi-tenant leases may use single-tenant networks: {}", config.allow_multi_to_use_single);
    info!("  Partial network fulfillment: {}", config.partial_network_fulfillment);
    info!("  Metrics address: {}", config.metrics_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
