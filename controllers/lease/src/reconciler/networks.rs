//! Network matching: which networks a pool offers, which are free, and
//! which a job's sibling leases already hold.

use super::index::ResourceIndex;
use crate::error::ControllerError;
use crds::{Lease, Network, NetworkType, Pool, port_group_name};
use kube::ResourceExt;

/// Networks backing a pool's topology, in topology order.
///
/// A network belongs to the pool when it sits in the pool's pod and its
/// port group matches the last segment of a topology entry. The first
/// match per entry wins.
pub fn networks_for_pool<'a>(index: &'a ResourceIndex, pool: &Pool) -> Vec<&'a Network> {
    let pod = pool.spec.site.pod.as_str();
    let mut found: Vec<&Network> = Vec::new();

    for path in &pool.spec.topology.networks {
        let port_group = port_group_name(path);
        let hit = index
            .networks()
            .find(|n| n.spec.pod_name.as_deref() == Some(pod) && n.spec.port_group_name == port_group);
        if let Some(network) = hit {
            if !found.iter().any(|f| f.name_any() == network.name_any()) {
                found.push(network);
            }
        }
    }
    found
}

/// Whether any indexed lease in the network's namespace owns it
pub fn is_network_owned(index: &ResourceIndex, network: &Network) -> bool {
    let name = network.name_any();
    let namespace = network.namespace();
    index.leases().any(|(_, lease)| {
        lease.namespace() == namespace && lease.network_refs().any(|r| r.name == name)
    })
}

/// Unowned networks of `pool` with the requested tenancy type.
pub fn available_networks(index: &ResourceIndex, pool: &Pool, network_type: NetworkType) -> Vec<Network> {
    networks_for_pool(index, pool)
        .into_iter()
        .filter(|n| n.network_type() == Some(network_type))
        .filter(|n| !is_network_owned(index, n))
        .cloned()
        .collect()
}

/// Networks already held by a sibling compute lease of the same job.
///
/// `lease` must be a Pending compute lease carrying the correlation label.
/// Siblings are compute leases in the same namespace with the same label,
/// in any phase; the first one (in index order) owning at least one
/// resolvable network supplies all of its networks. Any failure means "allocate fresh" to the caller.
pub fn common_networks_for_lease(index: &ResourceIndex, lease: &Lease) -> Result<Vec<Network>, ControllerError> {
    let name = lease.name_any();
    if lease.is_network_only() {
        return Err(ControllerError::NoCommonNetwork(format!("network-only lease {name}")));
    }
    let Some(job) = lease.correlation_id() else {
        return Err(ControllerError::NoCommonNetwork(format!("no correlation label on lease {name}")));
    };
    if lease.phase() != crds::LeasePhase::Pending {
        return Err(ControllerError::NoCommonNetwork(format!("lease {name} is already {}", lease.phase())));
    }

    let namespace = lease.namespace();
    for (_, sibling) in index.leases() {
        if sibling.namespace() != namespace || sibling.name_any() == name {
            continue;
        }
        if sibling.is_network_only() || sibling.correlation_id() != Some(job) {
            continue;
        }

        let held: Vec<Network> = sibling
            .network_refs()
            .flat_map(|r| {
                index
                    .networks()
                    .filter(move |n| n.name_any() == r.name && n.uid().as_deref() == Some(r.uid.as_str()))
            })
            .cloned()
            .collect();
        if !held.is_empty() {
            return Ok(held);
        }
    }

    Err(ControllerError::NoCommonNetwork(format!("no common network found for {name}")))
}

/// Whether `lease` already owns a network of `pool` on the same VLAN and
/// datacenter as `candidate`.
pub fn contains_port_group(index: &ResourceIndex, lease: &Lease, pool: &Pool, candidate: &Network) -> bool {
    let pool_networks = networks_for_pool(index, pool);
    lease.network_refs().any(|r| {
        pool_networks.iter().any(|n| {
            n.name_any() == r.name
                && n.spec.vlan_id == candidate.spec.vlan_id
                && n.spec.datacenter_name == candidate.spec.datacenter_name
        })
    })
}
