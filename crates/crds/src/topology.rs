//! vSphere topology shared by Pool specs and Lease statuses.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Placeholder written into a Lease status before any assignment
pub const PENDING: &str = "pending";
/// Placeholder datastore path
pub const PENDING_DATASTORE: &str = "/pending/datastore/pending";
/// Placeholder compute cluster path
pub const PENDING_COMPUTE_CLUSTER: &str = "/pending/host/pending";
/// Placeholder network path
pub const PENDING_NETWORK: &str = "/pending/network/pending";

/// Location of compute and network resources inside a vCenter
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Datacenter name
    #[serde(default)]
    pub datacenter: String,

    /// Compute cluster path (e.g. `/dc1/host/cluster1`)
    #[serde(default)]
    pub compute_cluster: String,

    /// Datastore path (e.g. `/dc1/datastore/ds1`)
    #[serde(default)]
    pub datastore: String,

    /// Port group paths (e.g. `/dc1/network/ci-vlan-100`)
    #[serde(default)]
    pub networks: Vec<String>,
}

/// Returns the port group name of a network path: its last `/` segment.
#[must_use]
pub fn port_group_name(network_path: &str) -> &str {
    network_path.rsplit('/').next().unwrap_or(network_path)
}

/// Builds the network path assigned to a lease for a port group.
#[must_use]
pub fn network_path(datacenter: &str, port_group: &str) -> String {
    format!("/{datacenter}/network/{port_group}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_group_name_takes_last_segment() {
        assert_eq!(port_group_name("/dc1/network/ci-vlan-100"), "ci-vlan-100");
        assert_eq!(port_group_name("ci-vlan-100"), "ci-vlan-100");
        assert_eq!(port_group_name("/dc1/network/"), "");
    }

    #[test]
    fn test_network_path() {
        assert_eq!(network_path("dc1", "ci-vlan-100"), "/dc1/network/ci-vlan-100");
    }
}
