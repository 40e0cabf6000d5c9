//! Mock CapacityStore for unit testing
//!
//! Stores objects in memory and mimics the API server behaviour the
//! reconciler relies on:
//! - `update_lease` never touches the status subresource
//! - a lease marked for deletion disappears once its last finalizer is removed
//! - touches stamp the `last-updated` annotation and are recorded for assertions

use crate::error::StoreError;
use crate::store_trait::CapacityStoreTrait;
use crds::{Lease, Network, Pool, LAST_UPDATED_ANNOTATION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock capacity store for testing
///
/// Cloning shares the underlying storage.
#[derive(Clone, Debug, Default)]
pub struct MockCapacityStore {
    leases: Arc<Mutex<BTreeMap<String, Lease>>>,
    pools: Arc<Mutex<BTreeMap<String, Pool>>>,
    networks: Arc<Mutex<BTreeMap<String, Network>>>,
    touched_leases: Arc<Mutex<Vec<String>>>,
    touched_pools: Arc<Mutex<Vec<String>>>,
    fail_updates: Arc<Mutex<bool>>,
    status_failure_after: Arc<Mutex<Option<usize>>>,
    next_uid: Arc<Mutex<u64>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn object_key<K: Resource>(obj: &K) -> Result<String, StoreError> {
    let name = obj
        .meta()
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject("object has no name".to_string()))?;
    Ok(key(obj.meta().namespace.as_deref().unwrap_or("default"), name))
}

impl MockCapacityStore {
    /// Create an empty mock store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn assign_uid<K: Resource>(&self, obj: &mut K) {
        if obj.meta().uid.is_none() {
            let mut next = locked(&self.next_uid);
            *next += 1;
            obj.meta_mut().uid = Some(format!("uid-{}", *next));
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if *locked(&self.fail_updates) {
            return Err(StoreError::Rejected("injected update failure".to_string()));
        }
        Ok(())
    }

    fn check_status_writable(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut after = locked(&self.status_failure_after);
        match *after {
            Some(0) => {
                *after = None;
                Err(StoreError::Rejected("injected status update failure".to_string()))
            }
            Some(n) => {
                *after = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Add a lease to the mock store (for test setup)
    pub fn add_lease(&self, mut lease: Lease) {
        self.assign_uid(&mut lease);
        if let Ok(k) = object_key(&lease) {
            locked(&self.leases).insert(k, lease);
        }
    }

    /// Add a pool to the mock store (for test setup)
    pub fn add_pool(&self, mut pool: Pool) {
        self.assign_uid(&mut pool);
        if let Ok(k) = object_key(&pool) {
            locked(&self.pools).insert(k, pool);
        }
    }

    /// Add a network to the mock store (for test setup)
    pub fn add_network(&self, mut network: Network) {
        self.assign_uid(&mut network);
        if let Ok(k) = object_key(&network) {
            locked(&self.networks).insert(k, network);
        }
    }

    /// Stored copy of a lease
    #[must_use]
    pub fn lease(&self, namespace: &str, name: &str) -> Option<Lease> {
        locked(&self.leases).get(&key(namespace, name)).cloned()
    }

    /// Stored copy of a pool
    #[must_use]
    pub fn pool(&self, namespace: &str, name: &str) -> Option<Pool> {
        locked(&self.pools).get(&key(namespace, name)).cloned()
    }

    /// Stored copy of a network
    #[must_use]
    pub fn network(&self, namespace: &str, name: &str) -> Option<Network> {
        locked(&self.networks).get(&key(namespace, name)).cloned()
    }

    /// Set a deletion timestamp on a lease, as `kubectl delete` would when finalizers remain
    pub fn mark_lease_deleted(&self, namespace: &str, name: &str, at: Time) {
        let mut leases = locked(&self.leases);
        let k = key(namespace, name);
        let drop_now = match leases.get_mut(&k) {
            Some(lease) => {
                lease.meta_mut().deletion_timestamp = Some(at);
                lease.finalizers().is_empty()
            }
            None => false,
        };
        if drop_now {
            leases.remove(&k);
        }
    }

    /// Remove a lease outright (no finalizer handshake)
    pub fn remove_lease(&self, namespace: &str, name: &str) {
        locked(&self.leases).remove(&key(namespace, name));
    }

    /// Make every subsequent write fail until reset
    pub fn set_fail_updates(&self, fail: bool) {
        *locked(&self.fail_updates) = fail;
    }

    /// Let `successes` lease status writes through, then fail the next one once
    pub fn fail_lease_status_update_after(&self, successes: usize) {
        *locked(&self.status_failure_after) = Some(successes);
    }

    /// `namespace/name` of every lease touched so far, in order
    #[must_use]
    pub fn touched_leases(&self) -> Vec<String> {
        locked(&self.touched_leases).clone()
    }

    /// `namespace/name` of every pool touched so far, in order
    #[must_use]
    pub fn touched_pools(&self) -> Vec<String> {
        locked(&self.touched_pools).clone()
    }

    /// Forget recorded touches
    pub fn clear_touches(&self) {
        locked(&self.touched_leases).clear();
        locked(&self.touched_pools).clear();
    }
}

#[async_trait::async_trait]
impl CapacityStoreTrait for MockCapacityStore {
    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Option<Lease>, StoreError> {
        Ok(self.lease(namespace, name))
    }

    async fn list_leases(&self) -> Result<Vec<Lease>, StoreError> {
        Ok(locked(&self.leases).values().cloned().collect())
    }

    async fn update_lease(&self, lease: &Lease) -> Result<Lease, StoreError> {
        self.check_writable()?;
        let k = object_key(lease)?;
        let mut leases = locked(&self.leases);
        let stored = leases
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound(format!("Lease {k} not found")))?;

        let status = stored.status.clone();
        *stored = lease.clone();
        stored.status = status;

        let result = stored.clone();
        if stored.meta().deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            leases.remove(&k);
        }
        Ok(result)
    }

    async fn update_lease_status(&self, lease: &Lease) -> Result<Lease, StoreError> {
        self.check_status_writable()?;
        let k = object_key(lease)?;
        let mut leases = locked(&self.leases);
        let stored = leases
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound(format!("Lease {k} not found")))?;
        stored.status = lease.status.clone();
        Ok(stored.clone())
    }

    async fn touch_lease(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let k = key(namespace, name);
        let mut leases = locked(&self.leases);
        let stored = leases
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound(format!("Lease {k} not found")))?;
        stored
            .annotations_mut()
            .insert(LAST_UPDATED_ANNOTATION.to_string(), crate::nudge_timestamp());
        locked(&self.touched_leases).push(k);
        Ok(())
    }

    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<Pool>, StoreError> {
        Ok(self.pool(namespace, name))
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError> {
        Ok(locked(&self.pools).values().cloned().collect())
    }

    async fn update_pool_status(&self, pool: &Pool) -> Result<Pool, StoreError> {
        self.check_writable()?;
        let k = object_key(pool)?;
        let mut pools = locked(&self.pools);
        let stored = pools
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound(format!("Pool {k} not found")))?;
        stored.status = pool.status.clone();
        Ok(stored.clone())
    }

    async fn touch_pool(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let k = key(namespace, name);
        let mut pools = locked(&self.pools);
        let stored = pools
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound(format!("Pool {k} not found")))?;
        stored
            .annotations_mut()
            .insert(LAST_UPDATED_ANNOTATION.to_string(), crate::nudge_timestamp());
        locked(&self.touched_pools).push(k);
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<Network>, StoreError> {
        Ok(locked(&self.networks).values().cloned().collect())
    }
}
