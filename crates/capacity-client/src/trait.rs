//! CapacityStore trait for mocking
//!
//! This trait abstracts the storage backend so the reconciler can be unit
//! tested without a cluster. [`crate::KubeCapacityStore`] implements it on
//! top of `kube::Api`; tests use [`crate::MockCapacityStore`].

use crate::error::StoreError;
use crds::{Lease, Network, Pool};

/// Trait for capacity resource storage operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CapacityStoreTrait: Send + Sync {
    // Lease Operations
    async fn get_lease(&self, namespace: &str, name: &str) -> Result<Option<Lease>, StoreError>;
    async fn list_leases(&self) -> Result<Vec<Lease>, StoreError>;
    /// Replaces metadata and spec; the status subresource is left untouched.
    async fn update_lease(&self, lease: &Lease) -> Result<Lease, StoreError>;
    /// Writes the status subresource only.
    async fn update_lease_status(&self, lease: &Lease) -> Result<Lease, StoreError>;
    /// Stamps the `last-updated` annotation to force re-evaluation.
    async fn touch_lease(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    // Pool Operations
    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<Pool>, StoreError>;
    async fn list_pools(&self) -> Result<Vec<Pool>, StoreError>;
    async fn update_pool_status(&self, pool: &Pool) -> Result<Pool, StoreError>;
    async fn touch_pool(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    // Network Operations
    async fn list_networks(&self) -> Result<Vec<Network>, StoreError>;
}
