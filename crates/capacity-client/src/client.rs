//! Kubernetes-backed capacity store
//!
//! Implements [`CapacityStoreTrait`] on top of `kube::Api`. Leases and
//! Pools are addressed by namespace; lists cover the watch namespace, or
//! the whole cluster when none is configured.

use crate::error::StoreError;
use crate::store_trait::CapacityStoreTrait;
use crds::{Lease, Network, Pool, LAST_UPDATED_ANNOTATION};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

/// Capacity store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeCapacityStore {
    client: Client,
    namespace: Option<String>,
}

impl std::fmt::Debug for KubeCapacityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCapacityStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeCapacityStore {
    /// Create a new store
    ///
    /// # Arguments
    /// * `client` - Kubernetes client
    /// * `namespace` - Namespace to list from; `None` lists cluster-wide
    #[must_use]
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn listable<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    async fn list_all<K>(&self) -> Result<Vec<K>, StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let list = self.listable::<K>().list(&ListParams::default()).await?;
        debug!("Listed {} {} objects", list.items.len(), K::kind(&()));
        Ok(list.items)
    }

    async fn touch<K>(&self, namespace: &str, name: &str) -> Result<(), StoreError>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let patch = json!({
            "metadata": {
                "annotations": {
                    LAST_UPDATED_ANNOTATION: crate::nudge_timestamp(),
                }
            }
        });
        self.namespaced::<K>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Touched {} {}/{}", K::kind(&()), namespace, name);
        Ok(())
    }

    /// Get a lease, `None` if it does not exist
    pub async fn get_lease(&self, namespace: &str, name: &str) -> Result<Option<Lease>, StoreError> {
        Ok(self.namespaced::<Lease>(namespace).get_opt(name).await?)
    }

    /// Replace lease metadata and spec
    pub async fn update_lease(&self, lease: &Lease) -> Result<Lease, StoreError> {
        let (namespace, name) = address(lease)?;
        let updated = self
            .namespaced::<Lease>(namespace)
            .replace(name, &PostParams::default(), lease)
            .await?;
        Ok(updated)
    }

    /// Merge-patch the lease status subresource
    pub async fn update_lease_status(&self, lease: &Lease) -> Result<Lease, StoreError> {
        let (namespace, name) = address(lease)?;
        let patch = json!({ "status": lease.status });
        let updated = self
            .namespaced::<Lease>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(updated)
    }

    /// Get a pool, `None` if it does not exist
    pub async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<Pool>, StoreError> {
        Ok(self.namespaced::<Pool>(namespace).get_opt(name).await?)
    }

    /// Merge-patch the pool status subresource
    pub async fn update_pool_status(&self, pool: &Pool) -> Result<Pool, StoreError> {
        let (namespace, name) = address(pool)?;
        let patch = json!({ "status": pool.status });
        let updated = self
            .namespaced::<Pool>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(updated)
    }
}

/// Namespace and name of an object, both required to address it
fn address<K: Resource>(obj: &K) -> Result<(&str, &str), StoreError> {
    let meta = obj.meta();
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject("object has no name".to_string()))?;
    let namespace = meta
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("object {name} has no namespace")))?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl CapacityStoreTrait for KubeCapacityStore {
    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Option<Lease>, StoreError> {
        self.get_lease(namespace, name).await
    }

    async fn list_leases(&self) -> Result<Vec<Lease>, StoreError> {
        self.list_all::<Lease>().await
    }

    async fn update_lease(&self, lease: &Lease) -> Result<Lease, StoreError> {
        self.update_lease(lease).await
    }

    async fn update_lease_status(&self, lease: &Lease) -> Result<Lease, StoreError> {
        self.update_lease_status(lease).await
    }

    async fn touch_lease(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.touch::<Lease>(namespace, name).await
    }

    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<Pool>, StoreError> {
        self.get_pool(namespace, name).await
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError> {
        self.list_all::<Pool>().await
    }

    async fn update_pool_status(&self, pool: &Pool) -> Result<Pool, StoreError> {
        self.update_pool_status(pool).await
    }

    async fn touch_pool(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.touch::<Pool>(namespace, name).await
    }

    async fn list_networks(&self) -> Result<Vec<Network>, StoreError> {
        self.list_all::<Network>().await
    }
}
