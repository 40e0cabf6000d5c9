//! Pool and network assignment for a single lease.
//!
//! Works on a copy of the lease; the caller persists the result and only
//! then commits it to the index.

use super::index::ResourceIndex;
use super::networks::{available_networks, common_networks_for_lease, contains_port_group};
use super::pool_strategy::{bind_pool, select_pool};
use crate::config::ControllerConfig;
use crate::env_vars::render_env_vars;
use crate::error::ControllerError;
use crds::{
    Lease, LeasePhase, LeaseStatus, Network, NetworkType, Pool, network_path, owner_reference, port_group_name,
};
use kube::ResourceExt;
use tracing::{debug, info, warn};

/// Allocation policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationOptions {
    /// Multi-tenant leases may take single-tenant networks when no
    /// multi-tenant network is free (never the reverse)
    pub allow_multi_to_use_single: bool,
    /// Assign whatever is free now and fill remaining slots later, instead
    /// of waiting until every requested network is free at once
    pub partial_network_fulfillment: bool,
}

impl Default for AllocationOptions {
    fn default() -> Self {
        Self {
            allow_multi_to_use_single: false,
            partial_network_fulfillment: true,
        }
    }
}

impl From<&ControllerConfig> for AllocationOptions {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            allow_multi_to_use_single: config.allow_multi_to_use_single,
            partial_network_fulfillment: config.partial_network_fulfillment,
        }
    }
}

/// Outcome of one allocation pass.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Lease with pool/network ownership, placement and phase applied
    pub lease: Lease,
    /// Pool hosting the lease
    pub pool: Pool,
    /// Networks assigned during this pass
    pub assigned: Vec<Network>,
}

impl Allocation {
    #[must_use]
    pub fn phase(&self) -> LeasePhase {
        self.lease.phase()
    }
}

fn requested_networks(lease: &Lease) -> usize {
    usize::try_from(lease.spec.networks).unwrap_or(usize::MAX)
}

/// Free networks of `pool` the lease may take, fallback tenancy included
fn fresh_networks(index: &ResourceIndex, lease: &Lease, pool: &Pool, options: AllocationOptions) -> Vec<Network> {
    let mut candidates = available_networks(index, pool, lease.spec.network_type);
    if options.allow_multi_to_use_single && lease.spec.network_type == NetworkType::MultiTenant {
        candidates.extend(available_networks(index, pool, NetworkType::SingleTenant));
    }
    candidates
}

fn candidate_networks(
    index: &ResourceIndex,
    lease: &Lease,
    pool: &Pool,
    common: Result<Vec<Network>, ControllerError>,
    options: AllocationOptions,
) -> Vec<Network> {
    match common {
        Ok(networks) => {
            info!("Lease {} joins {} network(s) held by its job", lease.name_any(), networks.len());
            networks
        }
        Err(reason) => {
            debug!("{}; allocating fresh networks", reason);
            fresh_networks(index, lease, pool, options)
        }
    }
}

/// Indexed networks the lease holds an owner reference to, matched by uid
fn owned_networks(index: &ResourceIndex, lease: &Lease) -> Vec<Network> {
    lease
        .network_refs()
        .filter_map(|r| {
            index
                .networks()
                .find(|n| n.name_any() == r.name && n.uid().as_deref() == Some(r.uid.as_str()))
        })
        .cloned()
        .collect()
}

/// Add the topology path of every owned network missing from status.
///
/// Ownership and status are written separately, so a lease can own a
/// network whose path never reached its status. Returns how many paths
/// were added.
fn restore_network_paths(lease: &mut Lease, owned: &[Network]) -> usize {
    let Some(status) = lease.status.as_mut() else {
        return 0;
    };
    let mut restored = 0;
    for network in owned {
        let port_group = network.spec.port_group_name.as_str();
        if status.topology.networks.iter().any(|p| port_group_name(p) == port_group) {
            continue;
        }
        let path = network_path(&status.topology.datacenter, port_group);
        status.topology.networks.push(path);
        restored += 1;
    }
    restored
}

/// Assign a pool (reusing an owned one) and fill open network slots.
///
/// `pools` are the freshly refreshed pools of this cycle. Fails with
/// `NoMatchingPool` when no pool qualifies and `InsufficientNetworks` when
/// no network (or, under the strict policy, not enough networks) can be
/// assigned. The phase becomes Fulfilled once the owned network count
/// equals the request, Partial otherwise.
pub fn allocate(
    index: &ResourceIndex,
    pools: &[Pool],
    lease: &Lease,
    options: AllocationOptions,
) -> Result<Allocation, ControllerError> {
    let name = lease.name_any();
    let mut lease = lease.clone();
    let requested = requested_networks(&lease);
    let common = common_networks_for_lease(index, &lease);

    let pool = match lease.pool_ref().map(|r| r.name.clone()) {
        Some(pool_name) => pools
            .iter()
            .find(|p| p.name_any() == pool_name && p.namespace() == lease.namespace())
            .cloned()
            .ok_or_else(|| {
                ControllerError::NoMatchingPool(format!("pool {pool_name} owned by lease {name} is not known"))
            })?,
        None => {
            let open = requested.saturating_sub(lease.network_count());
            let min_networks = if common.is_ok() || open == 0 {
                0
            } else if options.partial_network_fulfillment {
                1
            } else {
                i64::try_from(open).unwrap_or(i64::MAX)
            };
            select_pool(&lease, pools, min_networks, |pool| {
                min_networks == 0 || !fresh_networks(index, &lease, pool, options).is_empty()
            })?
        }
    };
    bind_pool(&mut lease, &pool);
    let pool_name = pool.name_any();

    let owned = owned_networks(index, &lease);
    let listed = lease.status.as_ref().map_or(0, |s| s.topology.networks.len());
    if listed < lease.network_count() {
        let restored = restore_network_paths(&mut lease, &owned);
        if restored > 0 {
            warn!("Lease {} owned {} network(s) missing from its topology, restored", name, restored);
        }
    }

    let mut assigned: Vec<Network> = Vec::new();
    if lease.network_count() < requested {
        let open = requested - lease.network_count();
        let candidates = candidate_networks(index, &lease, &pool, common, options);
        debug!(
            "Lease {}: {} candidate network(s) in pool {}, {} of {} slot(s) open",
            name,
            candidates.len(),
            pool_name,
            open,
            requested
        );
        if candidates.is_empty() {
            return Err(ControllerError::InsufficientNetworks(format!(
                "lease {name} requires {open} more network(s), 0 available in pool {pool_name}"
            )));
        }

        let datacenter = lease
            .status
            .as_ref()
            .map(|s| s.topology.datacenter.clone())
            .unwrap_or_default();
        for candidate in candidates {
            if lease.network_count() >= requested {
                break;
            }
            let candidate_name = candidate.name_any();
            if lease.network_refs().any(|r| r.name == candidate_name)
                || contains_port_group(index, &lease, &pool, &candidate)
            {
                debug!("Lease {} already holds port group of network {}", name, candidate_name);
                continue;
            }

            lease
                .metadata
                .owner_references
                .get_or_insert_with(Vec::new)
                .push(owner_reference(&candidate));
            lease
                .status
                .get_or_insert_with(LeaseStatus::default)
                .topology
                .networks
                .push(network_path(&datacenter, &candidate.spec.port_group_name));
            assigned.push(candidate);
        }

        if assigned.is_empty() {
            return Err(ControllerError::InsufficientNetworks(format!(
                "no assignable network for lease {name} in pool {pool_name}"
            )));
        }
        if !options.partial_network_fulfillment && lease.network_count() < requested {
            return Err(ControllerError::InsufficientNetworks(format!(
                "lease {name} requires {requested} network(s), only {} assignable in pool {pool_name}",
                lease.network_count()
            )));
        }
        if lease.network_count() < requested {
            info!(
                "Lease {} requested {} network(s), {} assigned so far",
                name,
                requested,
                lease.network_count()
            );
        }
    }

    let missing_env_vars = lease.status.as_ref().is_some_and(|s| s.env_vars.is_none());
    let env_network = match assigned.last() {
        Some(last) => Some(last),
        None if missing_env_vars => owned.last(),
        None => None,
    };
    if let Some(last) = env_network {
        match render_env_vars(&lease, &pool, last) {
            Ok(rendered) => {
                if let Some(status) = lease.status.as_mut() {
                    status.env_vars = Some(rendered);
                }
            }
            Err(e) => warn!("Lease {}: {}", name, e),
        }
    }

    let phase = if lease.network_count() == requested {
        LeasePhase::Fulfilled
    } else {
        LeasePhase::Partial
    };
    lease.status.get_or_insert_with(LeaseStatus::default).phase = phase;

    Ok(Allocation {
        lease,
        pool,
        assigned,
    })
}
