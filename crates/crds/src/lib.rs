//! vSphere Capacity Manager CRD Definitions
//!
//! Kubernetes Custom Resource Definitions shared by the lease controller
//! and the capacity store client.
//!
//! - [`Lease`]: a CI job's request for vCPU, memory and network segments
//! - [`Pool`]: a capacity envelope tied to a vCenter site
//! - [`Network`]: a single allocatable port group / VLAN

pub mod lease;
pub mod network;
pub mod pool;
pub mod topology;

pub use lease::*;
pub use network::*;
pub use pool::*;
pub use topology::*;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// API group for all capacity manager CRDs
pub const API_GROUP: &str = "vspherecapacitymanager.splat.io";

/// Annotation written to force re-evaluation of an otherwise unchanged object
pub const LAST_UPDATED_ANNOTATION: &str = "last-updated";

/// Builds a (non-controller) owner reference pointing at `obj`.
///
/// Leases carry one reference per owned Pool and Network, so none of them
/// may claim the `controller` flag.
pub fn owner_reference<K>(obj: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: obj.meta().name.clone().unwrap_or_default(),
        uid: obj.meta().uid.clone().unwrap_or_default(),
        ..Default::default()
    }
}
