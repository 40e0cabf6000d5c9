//! Lease CRD
//!
//! A CI job's request for vCPU, memory and network segments, and the record
//! of what has been granted.

use crate::network::NetworkType;
use crate::topology::Topology;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer owned by the lease controller
pub const LEASE_FINALIZER: &str = "vsphere-capacity-manager.splat-team.io/lease-finalizer";

/// Label grouping the leases of one CI job
pub const CORRELATION_LABEL: &str = "boskos-lease-id";

/// LeaseSpec defines the resources a CI job is asking for
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "vspherecapacitymanager.splat.io",
    version = "v1",
    kind = "Lease",
    namespaced,
    status = "LeaseStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct LeaseSpec {
    /// Requested vCPUs
    #[serde(default)]
    pub vcpus: u32,

    /// Requested memory in GiB
    #[serde(default)]
    pub memory: u32,

    /// Requested number of networks
    #[serde(default = "default_networks")]
    pub networks: u32,

    /// Requested tenancy type of the networks
    #[serde(default)]
    pub network_type: NetworkType,

    /// Only schedule onto the pool with this name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_pool: Option<String>,
}

fn default_networks() -> u32 {
    1
}

/// LeaseStatus records what has been granted to a lease
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaseStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: LeasePhase,

    /// Name of the assigned pool
    #[serde(default)]
    pub name: String,

    /// Short name of the assigned pool
    #[serde(default)]
    pub short_name: String,

    /// vCenter server the lease was scheduled to
    #[serde(default)]
    pub server: String,

    /// Failure domain region
    #[serde(default)]
    pub region: String,

    /// Failure domain zone
    #[serde(default)]
    pub zone: String,

    /// Assigned topology; `networks` holds one path per assigned network
    #[serde(default)]
    pub topology: Topology,

    /// Shell exports describing the assignment, consumed by CI steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<String>,
}

/// Lease lifecycle phase
///
/// Serializes as PascalCase ("Pending", "Partial", "Fulfilled") but also
/// accepts lowercase values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum LeasePhase {
    /// Nothing assigned yet
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Pool and some, but not all, networks assigned
    #[serde(alias = "partial")]
    Partial,

    /// Every requested network assigned
    #[serde(alias = "fulfilled")]
    Fulfilled,
}

impl std::fmt::Display for LeasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            Self::Pending => "Pending",
            Self::Partial => "Partial",
            Self::Fulfilled => "Fulfilled",
        };
        f.write_str(phase)
    }
}

impl Lease {
    /// Current phase; leases without a status are Pending
    #[must_use]
    pub fn phase(&self) -> LeasePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Leases requesting neither vCPU nor memory only want networks
    #[must_use]
    pub fn is_network_only(&self) -> bool {
        self.spec.vcpus == 0 && self.spec.memory == 0
    }

    /// Declared required pool, treating an empty string as unset
    #[must_use]
    pub fn required_pool(&self) -> Option<&str> {
        self.spec.required_pool.as_deref().filter(|p| !p.is_empty())
    }

    /// CI job identifier shared by sibling leases
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.labels().get(CORRELATION_LABEL).map(String::as_str)
    }

    /// Owner reference to the assigned pool, if any
    #[must_use]
    pub fn pool_ref(&self) -> Option<&OwnerReference> {
        self.owner_references().iter().find(|r| r.kind == "Pool")
    }

    /// Owner references to the assigned networks
    pub fn network_refs(&self) -> impl Iterator<Item = &OwnerReference> {
        self.owner_references().iter().filter(|r| r.kind == "Network")
    }

    /// Number of networks currently owned
    #[must_use]
    pub fn network_count(&self) -> usize {
        self.network_refs().count()
    }
}
