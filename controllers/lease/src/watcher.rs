//! Kubernetes resource watchers.
//!
//! This module handles watching Lease, Pool and Network resources and
//! triggering reconciliation using kube_runtime::Controller.
//!
//! All watchers use a generic `watch_resource()` helper that handles the
//! reconcile loop with automatic reconnection, and requeues failed cycles
//! with a per-resource Fibonacci backoff.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{Lease, Network, Pool};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as RuntimeConfig},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type ReconcileFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Action, ControllerError>> + Send>>;

fn resource_key<K: kube::Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Generic watcher helper around kube_runtime::Controller.
///
/// - reconnects and keeps watching indefinitely
/// - processes every event, nudges (annotation writes) included
/// - requeues failures after the resource's next Fibonacci backoff and
///   resets that backoff on the next success
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(Arc<Reconciler>, Arc<K>) -> ReconcileFuture + Send + Sync + Clone + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = resource_key(obj.as_ref());
        let (backoff, attempts) = ctx.get_backoff_for_resource(&key);
        match error {
            // Expected while capacity is short; retried until it frees up
            ControllerError::Delayed(_)
            | ControllerError::NoMatchingPool(_)
            | ControllerError::InsufficientNetworks(_) => {
                info!(
                    "{} {} not admitted (attempt {}), retrying in {:?}: {}",
                    resource_name, key, attempts, backoff, error
                );
            }
            _ => {
                error!(
                    "Reconciliation error for {} {} (attempt {}), retrying in {:?}: {}",
                    resource_name, key, attempts, backoff, error
                );
            }
        }
        Action::requeue(backoff)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        let key = resource_key(obj.as_ref());
        async move {
            debug!("Reconciling {}", key);
            let result = reconcile_fn(ctx.clone(), obj).await;
            if result.is_ok() {
                ctx.reset_error(&key);
            }
            result
        }
    };

    // Short debounce batches the burst of nudges a fulfilled lease triggers
    let controller_config = RuntimeConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                warn!("Controller error for {}: {}", resource_name, e);
            }
        })
        .await;

    Ok(())
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    lease_api: Api<Lease>,
    pool_api: Api<Pool>,
    network_api: Api<Network>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        lease_api: Api<Lease>,
        pool_api: Api<Pool>,
        network_api: Api<Network>,
    ) -> Self {
        Self {
            reconciler,
            lease_api,
            pool_api,
            network_api,
        }
    }

    /// Starts watching Lease resources.
    pub async fn watch_leases(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.lease_api.clone(),
            self.reconciler.clone(),
            |reconciler, lease| {
                Box::pin(async move {
                    let namespace = lease.namespace().unwrap_or_default();
                    reconciler.reconcile_lease(&namespace, &lease.name_any()).await?;
                    Ok(Action::await_change())
                })
            },
            "Lease",
        )
        .await
    }

    /// Starts watching Pool resources.
    pub async fn watch_pools(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.pool_api.clone(),
            self.reconciler.clone(),
            |reconciler, pool| {
                Box::pin(async move {
                    reconciler.reconcile_pool(&pool).await?;
                    Ok(Action::await_change())
                })
            },
            "Pool",
        )
        .await
    }

    /// Starts watching Network resources.
    pub async fn watch_networks(&self) -> Result<(), ControllerError> {
        watch_resource(
            self.network_api.clone(),
            self.reconciler.clone(),
            |reconciler, network| {
                Box::pin(async move {
                    reconciler.observe_network(&network).await?;
                    Ok(Action::await_change())
                })
            },
            "Network",
        )
        .await
    }
}
