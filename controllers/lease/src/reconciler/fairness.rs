//! Admission ordering between leases contending for the same pool.
//!
//! A Pending lease waits while another lease of the same tenancy type
//! either is Partial for a pool it could want, or is Pending for a pool it
//! could want and was created strictly earlier. Fulfilled leases never
//! block, and leases for unrelated pools or tenancy types run independently.

use super::index::{ResourceIndex, key_of};
use crds::{Lease, LeasePhase, PENDING};

/// Pool a lease is bound for, if it has a preference.
///
/// The declared required pool wins. A multi-network lease without one is
/// held to the pool it was already assigned so it can finish there.
pub fn effective_required_pool(lease: &Lease) -> Option<&str> {
    if let Some(pool) = lease.required_pool() {
        return Some(pool);
    }
    if lease.spec.networks > 1 {
        return lease
            .status
            .as_ref()
            .map(|s| s.name.as_str())
            .filter(|name| !name.is_empty() && *name != PENDING);
    }
    None
}

/// First indexed lease that `lease` has to wait for, if any.
pub fn blocking_lease<'a>(index: &'a ResourceIndex, lease: &Lease) -> Option<&'a Lease> {
    if lease.phase() != LeasePhase::Pending {
        return None;
    }

    let target = key_of(lease);
    let wanted = lease.required_pool();
    let created = lease.metadata.creation_timestamp.as_ref();

    index.leases().map(|(_, other)| other).find(|other| {
        if key_of(*other) == target || other.spec.network_type != lease.spec.network_type {
            return false;
        }
        let theirs = effective_required_pool(other);
        match other.phase() {
            LeasePhase::Fulfilled => false,
            LeasePhase::Partial => wanted.is_none() || theirs == wanted,
            LeasePhase::Pending => {
                let could_share = theirs == wanted || theirs.is_none() || wanted.is_none();
                could_share && other.metadata.creation_timestamp.as_ref() < created
            }
        }
    })
}

/// Whether a Pending lease must wait for older or partially served leases.
pub fn should_delay(index: &ResourceIndex, lease: &Lease) -> bool {
    blocking_lease(index, lease).is_some()
}
