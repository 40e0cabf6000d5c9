//! Network CRD
//!
//! A single network segment (port group / VLAN) usable by one job at a time.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the tenancy type of a Network
pub const NETWORK_TYPE_LABEL: &str = "vsphere-capacity-manager.splat-team.io/network-type";

/// NetworkSpec describes one allocatable port group
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "vspherecapacitymanager.splat.io",
    version = "v1",
    kind = "Network",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Port group name as seen in vCenter
    pub port_group_name: String,

    /// VLAN ID
    pub vlan_id: u32,

    /// vCenter datacenter the port group lives in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter_name: Option<String>,

    /// Physical pod the port group is trunked to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,

    /// Machine network CIDR handed to the CI job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_network_cidr: Option<String>,

    /// Default gateway of the segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// Netmask of the segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
}

/// Tenancy classification of a Network / Lease pairing
///
/// Serializes as kebab-case ("single-tenant", "multi-tenant").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkType {
    /// Segment dedicated to a single job
    #[default]
    SingleTenant,

    /// Segment shared between jobs
    MultiTenant,
}

impl NetworkType {
    /// Label value for this tenancy type
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleTenant => "single-tenant",
            Self::MultiTenant => "multi-tenant",
        }
    }

    /// Parses a label value; unknown values yield `None`
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "single-tenant" => Some(Self::SingleTenant),
            "multi-tenant" => Some(Self::MultiTenant),
            _ => None,
        }
    }
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Network {
    /// Tenancy type from the network-type label.
    ///
    /// Unlabeled networks are single-tenant. A label with an unknown value
    /// yields `None`, so the network never matches any lease request.
    #[must_use]
    pub fn network_type(&self) -> Option<NetworkType> {
        match self.labels().get(NETWORK_TYPE_LABEL) {
            Some(value) => NetworkType::from_label(value),
            None => Some(NetworkType::SingleTenant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_with_label(label: Option<&str>) -> Network {
        let mut network = Network::new(
            "ci-vlan-100",
            NetworkSpec {
                port_group_name: "ci-vlan-100".to_string(),
                vlan_id: 100,
                ..Default::default()
            },
        );
        if let Some(value) = label {
            network
                .labels_mut()
                .insert(NETWORK_TYPE_LABEL.to_string(), value.to_string());
        }
        network
    }

    #[test]
    fn test_unlabeled_network_is_single_tenant() {
        assert_eq!(network_with_label(None).network_type(), Some(NetworkType::SingleTenant));
    }

    #[test]
    fn test_labeled_network_type() {
        assert_eq!(
            network_with_label(Some("multi-tenant")).network_type(),
            Some(NetworkType::MultiTenant)
        );
        assert_eq!(network_with_label(Some("shared-ish")).network_type(), None);
    }

    #[test]
    fn test_network_type_serde() {
        assert_eq!(
            serde_json::to_value(NetworkType::MultiTenant).unwrap(),
            serde_json::json!("multi-tenant")
        );
        let parsed: NetworkType = serde_json::from_value(serde_json::json!("single-tenant")).unwrap();
        assert_eq!(parsed, NetworkType::SingleTenant);
    }
}
