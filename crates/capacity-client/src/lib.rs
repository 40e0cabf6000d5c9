//! Capacity Store Client
//!
//! Read/write access to the `Lease`, `Pool` and `Network` resources the
//! lease controller allocates from.
//!
//! # Example
//!
//! ```no_run
//! use capacity_client::{CapacityStoreTrait, KubeCapacityStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeCapacityStore::new(client, Some("vsphere-infra-helpers".to_string()));
//!
//! // Load a lease and nudge every pool
//! let lease = store.get_lease("vsphere-infra-helpers", "lease-abc").await?;
//! for pool in store.list_pools().await? {
//!     let name = pool.metadata.name.clone().unwrap_or_default();
//!     let namespace = pool.metadata.namespace.clone().unwrap_or_default();
//!     store.touch_pool(&namespace, &name).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Kubernetes backend**: [`KubeCapacityStore`] built on `kube::Api`
//! - **Mocking**: [`MockCapacityStore`] (feature `test-util`) keeps objects in memory

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeCapacityStore;
pub use error::StoreError;
pub use store_trait::CapacityStoreTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockCapacityStore;

/// RFC 3339 timestamp used as the value of the nudge annotation
#[must_use]
pub fn nudge_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
