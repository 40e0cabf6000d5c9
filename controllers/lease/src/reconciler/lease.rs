//! Lease reconciliation entry point.

use super::Reconciler;
use super::allocator::allocate;
use super::capacity::refresh_pool_status;
use super::fairness::{blocking_lease, should_delay};
use super::index::{ResourceIndex, object_key};
use crate::error::ControllerError;
use crds::{
    LEASE_FINALIZER, Lease, LeasePhase, LeaseStatus, NetworkType, PENDING, PENDING_COMPUTE_CLUSTER,
    PENDING_DATASTORE, PENDING_NETWORK, Topology,
};
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

/// Status written on first sight, before any placement exists
fn placeholder_status() -> LeaseStatus {
    LeaseStatus {
        phase: LeasePhase::Pending,
        name: PENDING.to_string(),
        short_name: PENDING.to_string(),
        server: PENDING.to_string(),
        region: PENDING.to_string(),
        zone: PENDING.to_string(),
        topology: Topology {
            datacenter: PENDING.to_string(),
            compute_cluster: PENDING_COMPUTE_CLUSTER.to_string(),
            datastore: PENDING_DATASTORE.to_string(),
            networks: vec![PENDING_NETWORK.to_string()],
        },
        env_vars: None,
    }
}

impl Reconciler {
    /// Reconciles one lease.
    ///
    /// The whole cycle, store I/O included, runs while holding the index
    /// lock, so at most one placement decision is in flight. Admission
    /// failures are returned as errors for the runtime to requeue.
    pub async fn reconcile_lease(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let mut index = self.index.lock().await;
        let key = object_key(namespace, name);
        debug!("Reconciling Lease {}", key);

        let Some(mut lease) = self.store.get_lease(namespace, name).await? else {
            if index.remove_lease(&key).is_some() {
                info!("Lease {} is gone, dropped from index", key);
            }
            return Ok(());
        };

        if lease.metadata.deletion_timestamp.is_some() {
            return self.release_lease(&mut index, lease).await;
        }

        if lease.status.is_none() {
            lease.status = Some(placeholder_status());
            lease = self.store.update_lease_status(&lease).await?;
        }

        if !lease.finalizers().iter().any(|f| f == LEASE_FINALIZER) {
            debug!("Adding finalizer to Lease {}", key);
            lease.finalizers_mut().push(LEASE_FINALIZER.to_string());
            lease = self.store.update_lease(&lease).await?;
        }

        index.upsert_lease(lease.clone());

        if lease.phase() == LeasePhase::Fulfilled {
            debug!("Lease {} is already fulfilled", key);
            return Ok(());
        }

        if let Some(pool_ref) = lease.pool_ref() {
            let pool_key = object_key(namespace, &pool_ref.name);
            if index.pool(&pool_key).is_none() {
                if let Some(pool) = self.store.get_pool(namespace, &pool_ref.name).await? {
                    index.upsert_pool(pool);
                }
            }
        }

        let pools = refresh_pool_status(&mut index);

        if should_delay(&index, &lease) {
            let reason = match blocking_lease(&index, &lease) {
                Some(blocker) => format!(
                    "lease {} waits for {} lease {}",
                    key,
                    blocker.phase(),
                    blocker.name_any()
                ),
                None => format!("lease {key} waits for an earlier lease"),
            };
            info!("{}", reason);
            self.nudge_oldest_lease(&index, lease.spec.network_type, &key).await;
            return Err(ControllerError::Delayed(reason));
        }

        info!("Allocating Lease {} (phase {})", key, lease.phase());
        let allocation = allocate(&index, &pools, &lease, self.options)?;

        let status = allocation.lease.status.clone();
        let mut persisted = self.store.update_lease(&allocation.lease).await?;
        persisted.status = status;
        let persisted = self.store.update_lease_status(&persisted).await?;

        let phase = allocation.phase();
        let pool_name = allocation.pool.name_any();
        info!(
            "Lease {} is {} on pool {}: {} new network(s), {} of {} held",
            key,
            phase,
            pool_name,
            allocation.assigned.len(),
            persisted.network_count(),
            persisted.spec.networks
        );
        index.upsert_lease(persisted);

        if phase == LeasePhase::Fulfilled {
            self.metrics.lease_fulfilled(namespace, &pool_name);
            refresh_pool_status(&mut index);
            self.touch_pools(&index).await;
            self.nudge_oldest_lease(&index, lease.spec.network_type, &key).await;
        }

        Ok(())
    }

    /// Releases a lease that is being deleted.
    ///
    /// Strips only our finalizer, forgets the lease and its gauge
    /// contribution, then nudges pools and the oldest waiting lease so the
    /// freed capacity is picked up.
    async fn release_lease(&self, index: &mut ResourceIndex, mut lease: Lease) -> Result<(), ControllerError> {
        let namespace = lease.namespace().unwrap_or_default();
        let key = object_key(&namespace, &lease.name_any());
        info!("Lease {} is being deleted, releasing its resources", key);

        if lease.finalizers().iter().any(|f| f == LEASE_FINALIZER) {
            lease.finalizers_mut().retain(|f| f != LEASE_FINALIZER);
            self.store.update_lease(&lease).await?;
        }

        index.remove_lease(&key);
        if lease.phase() == LeasePhase::Fulfilled {
            if let Some(pool) = lease.pool_ref() {
                self.metrics.lease_released(&namespace, &pool.name);
            }
        }

        refresh_pool_status(index);
        self.touch_pools(index).await;
        self.nudge_oldest_lease(index, lease.spec.network_type, &key).await;
        Ok(())
    }

    /// Stamps every indexed pool so its status gets recomputed
    pub(crate) async fn touch_pools(&self, index: &ResourceIndex) {
        for indexed in index.pools() {
            let pool = &indexed.pool;
            let namespace = pool.namespace().unwrap_or_default();
            if let Err(e) = self.store.touch_pool(&namespace, &pool.name_any()).await {
                warn!("Failed to touch Pool {}/{}: {}", namespace, pool.name_any(), e);
            }
        }
    }

    /// Stamps the oldest unfulfilled lease of `network_type` other than
    /// `exclude`, so it gets another admission attempt.
    pub(crate) async fn nudge_oldest_lease(&self, index: &ResourceIndex, network_type: NetworkType, exclude: &str) {
        let oldest = index
            .leases()
            .filter(|(key, lease)| {
                key.as_str() != exclude
                    && lease.spec.network_type == network_type
                    && lease.phase() != LeasePhase::Fulfilled
            })
            .min_by_key(|(_, lease)| lease.metadata.creation_timestamp.clone());

        if let Some((key, lease)) = oldest {
            let namespace = lease.namespace().unwrap_or_default();
            debug!("Nudging Lease {}", key);
            if let Err(e) = self.store.touch_lease(&namespace, &lease.name_any()).await {
                error!("Failed to nudge Lease {}: {}", key, e);
            }
        }
    }
}
