//! Underutilized-first pool selection and binding a lease to its pool.

use crate::error::ControllerError;
use crds::{Lease, LeaseStatus, PENDING_NETWORK, Pool, owner_reference};
use kube::ResourceExt;
use std::cmp::Ordering;

fn free_fraction(available: i64, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    available as f64 / f64::from(total)
}

fn rank(a: &Pool, b: &Pool) -> Ordering {
    let (Some(sa), Some(sb)) = (&a.status, &b.status) else {
        return Ordering::Equal;
    };
    free_fraction(sa.vcpus_available, a.spec.vcpus)
        .total_cmp(&free_fraction(sb.vcpus_available, b.spec.vcpus))
        .then_with(|| {
            free_fraction(sa.memory_available, a.spec.memory)
                .total_cmp(&free_fraction(sb.memory_available, b.spec.memory))
        })
        // lower name wins a full tie
        .then_with(|| b.name_any().cmp(&a.name_any()))
}

/// Pick the least utilized pool able to host `lease`.
///
/// `pools` must carry freshly computed status. A pool qualifies when it
/// matches the lease's required pool (or, with no requirement, is not
/// excluded), is not cordoned with `noSchedule`, has room for the
/// requested vCPUs, memory and at least `min_networks` networks, and
/// `has_networks` accepts it. The status count covers every tenancy type;
/// `has_networks` is where the caller checks for networks the lease can
/// actually take.
pub fn select_pool<F>(
    lease: &Lease,
    pools: &[Pool],
    min_networks: i64,
    has_networks: F,
) -> Result<Pool, ControllerError>
where
    F: Fn(&Pool) -> bool,
{
    let required = lease.required_pool();

    pools
        .iter()
        .filter(|pool| match required {
            Some(name) => pool.name_any() == name,
            None => !pool.spec.exclude,
        })
        .filter(|pool| !pool.spec.no_schedule)
        .filter(|pool| {
            pool.status.as_ref().is_some_and(|s| {
                s.vcpus_available >= i64::from(lease.spec.vcpus)
                    && s.memory_available >= i64::from(lease.spec.memory)
                    && s.network_available >= min_networks
            })
        })
        .filter(|pool| has_networks(pool))
        .max_by(|a, b| rank(a, b))
        .cloned()
        .ok_or_else(|| {
            ControllerError::NoMatchingPool(format!(
                "no pool{} can host lease {} (vcpus={}, memory={}, networks>={})",
                required.map(|r| format!(" named {r}")).unwrap_or_default(),
                lease.name_any(),
                lease.spec.vcpus,
                lease.spec.memory,
                min_networks
            ))
        })
}

/// Record `pool` as the lease's owner and copy its placement into status.
///
/// Idempotent for a lease already bound to `pool`. Drops the pending
/// network placeholder; already assigned networks stay.
pub fn bind_pool(lease: &mut Lease, pool: &Pool) {
    let pool_name = pool.name_any();
    let owners = lease.metadata.owner_references.get_or_insert_with(Vec::new);
    if !owners.iter().any(|r| r.kind == "Pool" && r.name == pool_name) {
        owners.retain(|r| r.kind != "Pool");
        owners.push(owner_reference(pool));
    }

    let status = lease.status.get_or_insert_with(LeaseStatus::default);
    status.name = pool_name;
    status.short_name.clone_from(&pool.spec.short_name);
    status.server.clone_from(&pool.spec.server);
    status.region.clone_from(&pool.spec.region);
    status.zone.clone_from(&pool.spec.zone);
    status.topology.datacenter.clone_from(&pool.spec.topology.datacenter);
    status.topology.datastore.clone_from(&pool.spec.topology.datastore);
    status.topology.compute_cluster.clone_from(&pool.spec.topology.compute_cluster);
    status.topology.networks.retain(|n| n != PENDING_NETWORK);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::capacity::refresh_pool_status;
    use crate::reconciler::index::ResourceIndex;
    use crate::test_utils::*;

    fn refreshed(pools: Vec<Pool>) -> Vec<Pool> {
        let mut index = ResourceIndex::new();
        for pool in pools {
            index.upsert_pool(pool);
        }
        refresh_pool_status(&mut index)
    }

    #[test]
    fn test_prefers_least_utilized_pool() {
        let mut busy = create_test_pool("busy", 16, &[100], "dc1", "pod1");
        busy.spec.over_commit_ratio = "0.5".to_string();
        let idle = create_test_pool("idle", 16, &[200], "dc2", "pod2");
        let pools = refreshed(vec![busy, idle]);

        let lease = create_test_lease("l1", 4, 1, "2024-01-01T00:00:00Z");
        assert_eq!(select_pool(&lease, &pools, 1, |_| true).unwrap().name_any(), "idle");
    }

    #[test]
    fn test_tie_breaks_on_name() {
        let pools = refreshed(vec![
            create_test_pool("pool-b", 16, &[100], "dc1", "pod1"),
            create_test_pool("pool-a", 16, &[200], "dc2", "pod2"),
        ]);
        let lease = create_test_lease("l1", 4, 1, "2024-01-01T00:00:00Z");
        assert_eq!(select_pool(&lease, &pools, 1, |_| true).unwrap().name_any(), "pool-a");
    }

    #[test]
    fn test_required_exclude_and_no_schedule() {
        let mut excluded = create_test_pool("excluded", 32, &[100], "dc1", "pod1");
        excluded.spec.exclude = true;
        let mut cordoned = create_test_pool("cordoned", 32, &[200], "dc2", "pod2");
        cordoned.spec.no_schedule = true;
        let normal = create_test_pool("normal", 8, &[300], "dc3", "pod3");
        let pools = refreshed(vec![excluded, cordoned, normal]);

        let lease = create_test_lease("l1", 4, 1, "2024-01-01T00:00:00Z");
        assert_eq!(select_pool(&lease, &pools, 1, |_| true).unwrap().name_any(), "normal");

        let pinned = create_test_lease("l2", 4, 1, "2024-01-01T00:00:00Z").requiring("excluded");
        assert_eq!(select_pool(&pinned, &pools, 1, |_| true).unwrap().name_any(), "excluded");

        let cordoned_pin = create_test_lease("l3", 4, 1, "2024-01-01T00:00:00Z").requiring("cordoned");
        assert!(matches!(
            select_pool(&cordoned_pin, &pools, 1, |_| true),
            Err(ControllerError::NoMatchingPool(_))
        ));
    }

    #[test]
    fn test_admission_rejects_oversized_requests() {
        let pools = refreshed(vec![create_test_pool("pool-a", 8, &[100], "dc1", "pod1")]);

        let too_big = create_test_lease("big", 9, 1, "2024-01-01T00:00:00Z");
        assert!(select_pool(&too_big, &pools, 1, |_| true).is_err());

        let fits = create_test_lease("fits", 8, 1, "2024-01-01T00:00:00Z");
        assert!(select_pool(&fits, &pools, 1, |_| true).is_ok());
        assert!(select_pool(&fits, &pools, 2, |_| true).is_err());
    }

    #[test]
    fn test_rejected_pool_falls_through_to_next_rank() {
        let pools = refreshed(vec![
            create_test_pool("pool-a", 32, &[100], "dc1", "pod1"),
            create_test_pool("pool-b", 16, &[200], "dc1", "pod2"),
        ]);
        let lease = create_test_lease("l1", 4, 1, "2024-01-01T00:00:00Z");

        assert_eq!(select_pool(&lease, &pools, 1, |_| true).unwrap().name_any(), "pool-a");
        let chosen = select_pool(&lease, &pools, 1, |p| p.name_any() != "pool-a").unwrap();
        assert_eq!(chosen.name_any(), "pool-b");
        assert!(matches!(
            select_pool(&lease, &pools, 1, |_| false),
            Err(ControllerError::NoMatchingPool(_))
        ));
    }

    #[test]
    fn test_bind_pool_copies_placement() {
        let pool = create_test_pool("pool-a", 16, &[100], "dc1", "pod1");
        let mut lease = create_test_lease("l1", 4, 1, "2024-01-01T00:00:00Z");
        lease.status = Some(LeaseStatus {
            topology: crds::Topology {
                networks: vec![PENDING_NETWORK.to_string()],
                ..Default::default()
            },
            ..Default::default()
        });

        bind_pool(&mut lease, &pool);

        assert_eq!(lease.pool_ref().map(|r| r.name.as_str()), Some("pool-a"));
        let status = lease.status.unwrap();
        assert_eq!(status.name, "pool-a");
        assert_eq!(status.server, "vcenter-dc1-pod1.example.com");
        assert_eq!(status.topology.datacenter, "dc1");
        assert_eq!(status.topology.compute_cluster, "/dc1/host/pool-a");
        assert!(status.topology.networks.is_empty());
    }
}
