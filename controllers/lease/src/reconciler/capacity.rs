//! Pool capacity accounting.
//!
//! Recomputed from the index at the start of every cycle. Network usage is
//! tracked per site (datacenter, pod): pools at one site draw from the same
//! physical port groups, so a segment used through any of them is used for
//! all of them.

use super::index::ResourceIndex;
use crds::{Pool, PoolSite, PoolStatus, port_group_name};
use kube::ResourceExt;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    vcpus: i64,
    memory: i64,
    leases: u32,
}

/// Recompute status of every indexed pool and return refreshed copies.
///
/// `vcpusAvailable = floor(vcpus * overcommit) - sum(owning lease vcpus)`;
/// memory likewise without overcommit; `networkAvailable` counts topology
/// entries whose port group is not used at the pool's site.
pub fn refresh_pool_status(index: &mut ResourceIndex) -> Vec<Pool> {
    let pool_names: HashSet<String> = index.pools().map(|p| p.pool.name_any()).collect();

    let mut usage: HashMap<String, Usage> = HashMap::new();
    let mut in_use: HashMap<PoolSite, HashSet<String>> = HashMap::new();

    for (_, lease) in index.leases() {
        let Some(pool_ref) = lease.pool_ref() else {
            continue;
        };
        if !pool_names.contains(&pool_ref.name) {
            continue;
        }

        let used = usage.entry(pool_ref.name.clone()).or_default();
        used.vcpus += i64::from(lease.spec.vcpus);
        used.memory += i64::from(lease.spec.memory);
        used.leases += 1;

        let Some(status) = &lease.status else {
            continue;
        };
        if let Some(site) = index.site_for_server(&status.server) {
            let port_groups = in_use.entry(site.clone()).or_default();
            for path in &status.topology.networks {
                port_groups.insert(port_group_name(path).to_string());
            }
        }
    }

    for indexed in index.pools_mut() {
        let name = indexed.pool.name_any();
        let used = usage.get(&name).copied().unwrap_or_default();
        let spec = &indexed.pool.spec;

        let vcpu_capacity = (f64::from(spec.vcpus) * indexed.over_commit_ratio).floor() as i64;
        let taken = in_use.get(&spec.site);
        let free_networks = spec
            .topology
            .networks
            .iter()
            .filter(|path| !taken.is_some_and(|t| t.contains(port_group_name(path))))
            .count();

        let status = PoolStatus {
            vcpus_available: vcpu_capacity - used.vcpus,
            memory_available: i64::from(spec.memory) - used.memory,
            network_available: i64::try_from(free_networks).unwrap_or(i64::MAX),
            lease_count: used.leases,
        };
        debug!(
            "Pool {}: vcpus {}/{}, memory {}, networks {}, leases {}",
            name, status.vcpus_available, vcpu_capacity, status.memory_available, status.network_available, status.lease_count
        );
        indexed.pool.status = Some(status);
    }

    index.pools().map(|p| p.pool.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crds::{Lease, LeaseStatus, network_path, owner_reference};

    fn bound(mut lease: Lease, pool: &Pool, vlans: &[u32]) -> Lease {
        lease
            .metadata
            .owner_references
            .get_or_insert_with(Vec::new)
            .push(owner_reference(pool));
        lease.status = Some(LeaseStatus {
            name: pool.name_any(),
            server: pool.spec.server.clone(),
            topology: crds::Topology {
                datacenter: pool.spec.topology.datacenter.clone(),
                networks: vlans
                    .iter()
                    .map(|v| network_path(&pool.spec.topology.datacenter, &port_group(*v)))
                    .collect(),
                ..Default::default()
            },
            ..Default::default()
        });
        lease
    }

    fn status_of(pools: &[Pool], name: &str) -> PoolStatus {
        pools
            .iter()
            .find(|p| p.name_any() == name)
            .and_then(|p| p.status.clone())
            .unwrap()
    }

    #[test]
    fn test_usage_subtracted_from_capacity() {
        let mut index = ResourceIndex::new();
        let pool = create_test_pool("pool-a", 16, &[100, 101], "dc1", "pod1");
        index.upsert_pool(pool.clone());
        index.upsert_lease(bound(create_test_lease("l1", 4, 1, "2024-01-01T00:00:00Z"), &pool, &[100]));

        let pools = refresh_pool_status(&mut index);
        let status = status_of(&pools, "pool-a");
        assert_eq!(status.vcpus_available, 12);
        assert_eq!(status.memory_available, 256 - 16);
        assert_eq!(status.network_available, 1);
        assert_eq!(status.lease_count, 1);
    }

    #[test]
    fn test_overcommit_floors_capacity() {
        let mut index = ResourceIndex::new();
        let mut pool = create_test_pool("pool-a", 15, &[100], "dc1", "pod1");
        pool.spec.over_commit_ratio = "1.5".to_string();
        index.upsert_pool(pool);

        let pools = refresh_pool_status(&mut index);
        assert_eq!(status_of(&pools, "pool-a").vcpus_available, 22);
    }

    #[test]
    fn test_network_usage_shared_across_site() {
        let mut index = ResourceIndex::new();
        let pool_a = create_test_pool("pool-a", 16, &[100, 101], "dc1", "pod1");
        let pool_b = create_test_pool("pool-b", 16, &[100, 101, 102], "dc1", "pod1");
        let pool_c = create_test_pool("pool-c", 16, &[100], "dc2", "pod2");
        index.upsert_pool(pool_a.clone());
        index.upsert_pool(pool_b);
        index.upsert_pool(pool_c);
        index.upsert_lease(bound(create_test_lease("l1", 2, 1, "2024-01-01T00:00:00Z"), &pool_a, &[101]));

        let pools = refresh_pool_status(&mut index);
        assert_eq!(status_of(&pools, "pool-a").network_available, 1);
        assert_eq!(status_of(&pools, "pool-b").network_available, 2);
        assert_eq!(status_of(&pools, "pool-c").network_available, 1);
        assert_eq!(status_of(&pools, "pool-b").vcpus_available, 16);
    }

    #[test]
    fn test_network_only_lease_uses_networks_not_compute() {
        let mut index = ResourceIndex::new();
        let pool = create_test_pool("pool-a", 16, &[100, 101], "dc1", "pod1");
        index.upsert_pool(pool.clone());
        index.upsert_lease(bound(create_test_lease("net-only", 0, 1, "2024-01-01T00:00:00Z"), &pool, &[100]));

        let pools = refresh_pool_status(&mut index);
        let status = status_of(&pools, "pool-a");
        assert_eq!(status.vcpus_available, 16);
        assert_eq!(status.memory_available, 256);
        assert_eq!(status.network_available, 1);
    }

    #[test]
    fn test_unbound_and_unknown_pool_leases_ignored() {
        let mut index = ResourceIndex::new();
        let pool = create_test_pool("pool-a", 16, &[100], "dc1", "pod1");
        let ghost = create_test_pool("ghost", 16, &[100], "dc1", "pod1");
        index.upsert_pool(pool);
        index.upsert_lease(create_test_lease("pending", 4, 1, "2024-01-01T00:00:00Z"));
        index.upsert_lease(bound(create_test_lease("orphan", 4, 1, "2024-01-01T00:00:00Z"), &ghost, &[100]));

        let pools = refresh_pool_status(&mut index);
        let status = status_of(&pools, "pool-a");
        assert_eq!(status.vcpus_available, 16);
        assert_eq!(status.network_available, 1);
    }
}
