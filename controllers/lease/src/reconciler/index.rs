//! In-memory working set of Leases, Pools and Networks.
//!
//! Keys are `namespace/name`. Maps are ordered so every scan within a
//! reconcile cycle visits objects in the same order.

use crds::{Lease, Network, Pool, PoolSite};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::warn;

/// Index key for a namespaced object
#[must_use]
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Index key derived from an object's metadata
pub fn key_of<K: Resource>(obj: &K) -> Option<String> {
    let name = obj.meta().name.as_deref()?;
    Some(object_key(obj.meta().namespace.as_deref().unwrap_or("default"), name))
}

/// A Pool plus its parsed overcommit ratio.
#[derive(Debug, Clone)]
pub struct IndexedPool {
    /// Pool as last seen, status included
    pub pool: Pool,
    /// Parsed `overCommitRatio`, 1.0 when the spec value is malformed
    pub over_commit_ratio: f64,
}

impl IndexedPool {
    fn new(pool: Pool) -> Self {
        let over_commit_ratio = match pool.spec.parse_over_commit_ratio() {
            Ok(ratio) => ratio,
            Err(e) => {
                warn!("Pool {}: {}, using 1.0", pool.name_any(), e);
                1.0
            }
        };
        Self {
            pool,
            over_commit_ratio,
        }
    }
}

/// Resource index shared by all reconcile cycles (behind the reconcile lock).
#[derive(Debug, Default)]
pub struct ResourceIndex {
    leases: BTreeMap<String, Lease>,
    pools: BTreeMap<String, IndexedPool>,
    networks: BTreeMap<String, Network>,
}

impl ResourceIndex {
    /// Empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a live lease
    pub fn upsert_lease(&mut self, lease: Lease) {
        if let Some(key) = key_of(&lease) {
            self.leases.insert(key, lease);
        }
    }

    /// Drop a lease, returning the indexed copy if there was one
    pub fn remove_lease(&mut self, key: &str) -> Option<Lease> {
        self.leases.remove(key)
    }

    /// All indexed leases with their keys, in key order
    pub fn leases(&self) -> impl Iterator<Item = (&String, &Lease)> {
        self.leases.iter()
    }

    /// Insert or refresh a pool, parsing its overcommit ratio
    pub fn upsert_pool(&mut self, pool: Pool) {
        if let Some(key) = key_of(&pool) {
            self.pools.insert(key, IndexedPool::new(pool));
        }
    }

    /// Indexed pool by `namespace/name` key
    #[must_use]
    pub fn pool(&self, key: &str) -> Option<&IndexedPool> {
        self.pools.get(key)
    }

    /// All indexed pools, in key order
    pub fn pools(&self) -> impl Iterator<Item = &IndexedPool> {
        self.pools.values()
    }

    /// Mutable pools, for status refresh
    pub(crate) fn pools_mut(&mut self) -> impl Iterator<Item = &mut IndexedPool> {
        self.pools.values_mut()
    }

    /// Site of the first pool served by `server`
    #[must_use]
    pub fn site_for_server(&self, server: &str) -> Option<&PoolSite> {
        self.pools
            .values()
            .find(|p| p.pool.spec.server == server)
            .map(|p| &p.pool.spec.site)
    }

    /// Insert or replace a network
    pub fn upsert_network(&mut self, network: Network) {
        if let Some(key) = key_of(&network) {
            self.networks.insert(key, network);
        }
    }

    /// All indexed networks, in key order
    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// (leases, pools, networks) counts
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.leases.len(), self.pools.len(), self.networks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_overcommit_ratio_parsed_once() {
        let mut index = ResourceIndex::new();
        let mut pool = create_test_pool("pool-a", 16, &[100], "dc1", "pod1");
        pool.spec.over_commit_ratio = " 1.5 ".to_string();
        index.upsert_pool(pool);

        let indexed = index.pool("ci/pool-a").unwrap();
        assert!((indexed.over_commit_ratio - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bad_overcommit_ratio_falls_back() {
        let mut index = ResourceIndex::new();
        for (name, ratio) in [("nan", "NaN"), ("neg", "-2"), ("text", "lots")] {
            let mut pool = create_test_pool(name, 16, &[100], "dc1", "pod1");
            pool.spec.over_commit_ratio = ratio.to_string();
            index.upsert_pool(pool);
        }
        assert!(index.pools().all(|p| (p.over_commit_ratio - 1.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_lease_upsert_and_remove() {
        let mut index = ResourceIndex::new();
        index.upsert_lease(create_test_lease("lease-1", 4, 1, "2024-01-01T00:00:00Z"));
        assert_eq!(index.counts(), (1, 0, 0));

        assert!(index.remove_lease("ci/lease-1").is_some());
        assert!(index.remove_lease("ci/lease-1").is_none());
        assert_eq!(index.counts(), (0, 0, 0));
    }

    #[test]
    fn test_site_for_server() {
        let mut index = ResourceIndex::new();
        index.upsert_pool(create_test_pool("pool-a", 16, &[100], "dc1", "pod1"));
        index.upsert_pool(create_test_pool("pool-b", 16, &[200], "dc2", "pod7"));

        let site = index.site_for_server("vcenter-dc2-pod7.example.com").unwrap();
        assert_eq!(site.pod, "pod7");
        assert!(index.site_for_server("pending").is_none());
    }
}
