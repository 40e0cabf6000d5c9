//! Pool and Network observation.

use super::Reconciler;
use super::capacity::refresh_pool_status;
use super::index::object_key;
use crate::error::ControllerError;
use crds::{Network, Pool};
use kube::ResourceExt;
use tracing::{debug, info};

impl Reconciler {
    /// Records a pool and publishes its recomputed status.
    ///
    /// The status subresource is written only when the numbers changed, so
    /// the status write does not feed back into another cycle.
    pub async fn reconcile_pool(&self, pool: &Pool) -> Result<(), ControllerError> {
        let mut index = self.index.lock().await;
        let namespace = pool.namespace().unwrap_or_default();
        let name = pool.name_any();
        let key = object_key(&namespace, &name);
        debug!("Reconciling Pool {}", key);

        if pool.metadata.deletion_timestamp.is_some() {
            debug!("Pool {} is being deleted, keeping last known state", key);
            return Ok(());
        }

        index.upsert_pool(pool.clone());
        let refreshed = refresh_pool_status(&mut index);

        let Some(current) = refreshed
            .into_iter()
            .find(|p| p.name_any() == name && p.namespace().unwrap_or_default() == namespace)
        else {
            return Ok(());
        };

        if current.status == pool.status {
            debug!("Pool {} status unchanged", key);
            return Ok(());
        }

        if let Some(status) = &current.status {
            info!(
                "Pool {}: {} vCPU, {} GiB, {} network(s) available, {} lease(s)",
                key, status.vcpus_available, status.memory_available, status.network_available, status.lease_count
            );
        }
        self.store.update_pool_status(&current).await?;
        Ok(())
    }

    /// Records a network so later cycles can match it against pools.
    pub async fn observe_network(&self, network: &Network) -> Result<(), ControllerError> {
        let mut index = self.index.lock().await;
        debug!(
            "Observed Network {}/{} (port group {}, VLAN {})",
            network.namespace().unwrap_or_default(),
            network.name_any(),
            network.spec.port_group_name,
            network.spec.vlan_id
        );
        index.upsert_network(network.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::allocator::AllocationOptions;
    use crate::test_utils::*;
    use capacity_client::MockCapacityStore;

    #[tokio::test]
    async fn test_reconcile_pool_publishes_status() {
        let store = MockCapacityStore::new();
        let pool = create_test_pool("pool-a", 16, &[100, 101], "dc1", "pod1");
        store.add_pool(pool.clone());
        let reconciler = create_test_reconciler(&store, AllocationOptions::default());

        reconciler.reconcile_pool(&pool).await.unwrap();

        let status = store.pool(TEST_NAMESPACE, "pool-a").unwrap().status.unwrap();
        assert_eq!(status.vcpus_available, 16);
        assert_eq!(status.memory_available, 256);
        assert_eq!(status.network_available, 2);
        assert_eq!(status.lease_count, 0);
    }

    #[tokio::test]
    async fn test_unchanged_status_is_not_written() {
        let store = MockCapacityStore::new();
        let pool = create_test_pool("pool-a", 16, &[100], "dc1", "pod1");
        store.add_pool(pool.clone());
        let reconciler = create_test_reconciler(&store, AllocationOptions::default());

        reconciler.reconcile_pool(&pool).await.unwrap();
        let published = store.pool(TEST_NAMESPACE, "pool-a").unwrap();

        // A second pass over the already published pool must not write
        store.set_fail_updates(true);
        reconciler.reconcile_pool(&published).await.unwrap();
    }

    #[tokio::test]
    async fn test_observe_network_indexes_it() {
        let store = MockCapacityStore::new();
        let reconciler = create_test_reconciler(&store, AllocationOptions::default());

        reconciler
            .observe_network(&create_test_network("net-100", 100, "dc1", "pod1", None))
            .await
            .unwrap();

        assert_eq!(reconciler.index.lock().await.counts(), (0, 0, 1));
    }
}
