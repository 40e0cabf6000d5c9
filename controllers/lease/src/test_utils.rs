//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::metrics::LeaseMetrics;
use crate::reconciler::allocator::AllocationOptions;
use crate::reconciler::Reconciler;
use capacity_client::MockCapacityStore;
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Namespace every test object lives in
pub const TEST_NAMESPACE: &str = "ci";

/// Parse an RFC 3339 timestamp into a Kubernetes `Time`
pub fn time(rfc3339: &str) -> Time {
    serde_json::from_value(serde_json::json!(rfc3339)).unwrap()
}

/// Port group name used for a VLAN in test fixtures
pub fn port_group(vlan: u32) -> String {
    format!("ci-vlan-{vlan}")
}

/// Helper to create a test Pool whose topology lists one port group per VLAN
pub fn create_test_pool(name: &str, vcpus: u32, vlans: &[u32], datacenter: &str, pod: &str) -> Pool {
    let mut pool = Pool::new(
        name,
        PoolSpec {
            short_name: name.to_string(),
            server: format!("vcenter-{datacenter}-{pod}.example.com"),
            region: "us-east".to_string(),
            zone: format!("us-east-{pod}"),
            topology: Topology {
                datacenter: datacenter.to_string(),
                compute_cluster: format!("/{datacenter}/host/{name}"),
                datastore: format!("/{datacenter}/datastore/{name}"),
                networks: vlans
                    .iter()
                    .map(|vlan| network_path(datacenter, &port_group(*vlan)))
                    .collect(),
            },
            vcpus,
            memory: 256,
            over_commit_ratio: "1.0".to_string(),
            site: PoolSite {
                datacenter: datacenter.to_string(),
                pod: pod.to_string(),
            },
            exclude: false,
            no_schedule: false,
        },
    );
    pool.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    pool
}

/// Helper to create a test Network for a VLAN, optionally labeled with a tenancy type
pub fn create_test_network(
    name: &str,
    vlan: u32,
    datacenter: &str,
    pod: &str,
    network_type: Option<NetworkType>,
) -> Network {
    let mut network = Network::new(
        name,
        NetworkSpec {
            port_group_name: port_group(vlan),
            vlan_id: vlan,
            datacenter_name: Some(datacenter.to_string()),
            pod_name: Some(pod.to_string()),
            machine_network_cidr: Some(format!("192.168.{}.0/24", vlan % 256)),
            gateway: None,
            netmask: None,
        },
    );
    network.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    if let Some(network_type) = network_type {
        network.metadata.labels = Some(BTreeMap::from([(
            NETWORK_TYPE_LABEL.to_string(),
            network_type.as_str().to_string(),
        )]));
    }
    network
}

/// Helper to create a Pending test Lease without status
///
/// Memory is requested at 4 GiB per vCPU, so `vcpus == 0` yields a network-only lease.
pub fn create_test_lease(name: &str, vcpus: u32, networks: u32, created: &str) -> Lease {
    Lease {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            creation_timestamp: Some(time(created)),
            ..Default::default()
        },
        spec: LeaseSpec {
            vcpus,
            memory: vcpus * 4,
            networks,
            network_type: NetworkType::SingleTenant,
            required_pool: None,
        },
        status: None,
    }
}

/// Builder-style tweaks for test leases
pub trait LeaseFixture {
    /// Request a specific pool
    fn requiring(self, pool: &str) -> Self;
    /// Request a tenancy type
    fn with_network_type(self, network_type: NetworkType) -> Self;
    /// Set the correlation label
    fn in_job(self, job: &str) -> Self;
    /// Set status phase (and the assigned pool name)
    fn in_phase(self, phase: LeasePhase, pool: &str) -> Self;
}

impl LeaseFixture for Lease {
    fn requiring(mut self, pool: &str) -> Self {
        self.spec.required_pool = Some(pool.to_string());
        self
    }

    fn with_network_type(mut self, network_type: NetworkType) -> Self {
        self.spec.network_type = network_type;
        self
    }

    fn in_job(mut self, job: &str) -> Self {
        self.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(CORRELATION_LABEL.to_string(), job.to_string());
        self
    }

    fn in_phase(mut self, phase: LeasePhase, pool: &str) -> Self {
        let status = self.status.get_or_insert_with(LeaseStatus::default);
        status.phase = phase;
        status.name = pool.to_string();
        self
    }
}

/// Reconciler over a mock store with the given allocation options
pub fn create_test_reconciler(store: &MockCapacityStore, options: AllocationOptions) -> Reconciler {
    let metrics = Arc::new(LeaseMetrics::new().unwrap());
    Reconciler::new(Box::new(store.clone()), metrics, options)
}
