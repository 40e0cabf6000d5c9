//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the capacity
//! store, the reconciler, the watchers and the metrics endpoint together.
//!
//! The controller watches three CRD types:
//! - Lease: a CI job's request for capacity and networks
//! - Pool: a vSphere failure domain offering capacity
//! - Network: a port group that can be leased

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::{self, LeaseMetrics};
use crate::reconciler::Reconciler;
use crate::reconciler::allocator::AllocationOptions;
use crate::watcher::Watcher;
use capacity_client::KubeCapacityStore;
use crds::{Lease, Network, Pool};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Main controller for lease allocation.
pub struct Controller {
    lease_watcher: JoinHandle<Result<(), ControllerError>>,
    pool_watcher: JoinHandle<Result<(), ControllerError>>,
    network_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Lease Controller");

        let kube_client = Client::try_default().await?;
        let namespace = config.namespace.as_deref();

        let store = KubeCapacityStore::new(kube_client.clone(), config.namespace.clone());
        let lease_metrics = Arc::new(LeaseMetrics::new()?);
        let reconciler = Reconciler::new(
            Box::new(store),
            lease_metrics.clone(),
            AllocationOptions::from(&config),
        );

        // Rebuild the index before any cycle runs
        info!("Performing startup reconciliation...");
        if let Err(e) = reconciler.startup_reconciliation().await {
            warn!("Startup reconciliation failed (will continue): {}", e);
        } else {
            info!("Startup reconciliation completed");
        }

        let reconciler_arc = Arc::new(reconciler);
        let watcher_instance = Arc::new(Watcher::new(
            reconciler_arc,
            api::<Lease>(&kube_client, namespace),
            api::<Pool>(&kube_client, namespace),
            api::<Network>(&kube_client, namespace),
        ));

        let lease_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_leases().await })
        };

        let pool_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_pools().await })
        };

        let network_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_networks().await })
        };

        let metrics_server = {
            let addr = config.metrics_addr;
            tokio::spawn(async move { metrics::serve(addr, lease_metrics).await })
        };

        Ok(Self {
            lease_watcher,
            pool_watcher,
            network_watcher,
            metrics_server,
        })
    }

    /// Runs until any task exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Lease Controller running");

        tokio::select! {
            result = &mut self.lease_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Lease watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Lease watcher error: {}", e)))?;
            }
            result = &mut self.pool_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Pool watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Pool watcher error: {}", e)))?;
            }
            result = &mut self.network_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Network watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Network watcher error: {}", e)))?;
            }
            result = &mut self.metrics_server => {
                result.map_err(|e| ControllerError::Watch(format!("Metrics server panicked: {}", e)))??;
            }
        }

        Ok(())
    }
}
