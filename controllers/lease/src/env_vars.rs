//! Shell environment block handed to CI jobs through `status.envVars`.

use crate::error::ControllerError;
use crds::{Lease, Network, Pool, network_path};
use std::fmt::Write;

/// Render `export` lines describing where the lease landed.
///
/// Uses the lease's bound topology and the given (last assigned) network.
pub fn render_env_vars(lease: &Lease, pool: &Pool, network: &Network) -> Result<String, ControllerError> {
    let status = lease
        .status
        .as_ref()
        .ok_or_else(|| ControllerError::EnvVars("lease has no status".to_string()))?;

    if pool.spec.server.is_empty() {
        return Err(ControllerError::EnvVars(format!(
            "pool {} has no server",
            pool.metadata.name.as_deref().unwrap_or("<unknown>")
        )));
    }
    let datacenter = &status.topology.datacenter;
    if datacenter.is_empty() {
        return Err(ControllerError::EnvVars("lease topology has no datacenter".to_string()));
    }

    let port_group = &network.spec.port_group_name;
    let mut vars = vec![
        ("VSPHERE_SERVER", pool.spec.server.clone()),
        ("VSPHERE_DATACENTER", datacenter.clone()),
        ("VSPHERE_CLUSTER", status.topology.compute_cluster.clone()),
        ("VSPHERE_DATASTORE", status.topology.datastore.clone()),
        ("VSPHERE_NETWORK", network_path(datacenter, port_group)),
        ("VSPHERE_PORTGROUP", port_group.clone()),
        ("VLAN_ID", network.spec.vlan_id.to_string()),
    ];
    if let Some(cidr) = &network.spec.machine_network_cidr {
        vars.push(("MACHINE_NETWORK_CIDR", cidr.clone()));
    }
    if let Some(gateway) = &network.spec.gateway {
        vars.push(("GATEWAY", gateway.clone()));
    }
    if let Some(netmask) = &network.spec.netmask {
        vars.push(("NETMASK", netmask.clone()));
    }

    let mut out = String::new();
    for (key, value) in vars {
        writeln!(out, "export {key}=\"{value}\"").map_err(|e| ControllerError::EnvVars(e.to_string()))?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_render_env_vars() {
        let pool = create_test_pool("pool-a", 16, &[100, 101], "dc1", "pod1");
        let network = create_test_network("net-100", 100, "dc1", "pod1", None);
        let mut lease = create_test_lease("lease-1", 4, 1, "2024-01-01T00:00:00Z");
        let status = lease.status.get_or_insert_with(Default::default);
        status.topology.datacenter = "dc1".to_string();
        status.topology.compute_cluster = "/dc1/host/cluster1".to_string();
        status.topology.datastore = "/dc1/datastore/ds1".to_string();

        let rendered = render_env_vars(&lease, &pool, &network).unwrap();
        assert!(rendered.contains("export VSPHERE_SERVER=\"vcenter-dc1-pod1.example.com\"\n"));
        assert!(rendered.contains("export VSPHERE_NETWORK=\"/dc1/network/ci-vlan-100\"\n"));
        assert!(rendered.contains("export VLAN_ID=\"100\"\n"));
        assert!(!rendered.contains("GATEWAY"));
    }

    #[test]
    fn test_render_requires_datacenter() {
        let pool = create_test_pool("pool-a", 16, &[100, 101], "dc1", "pod1");
        let network = create_test_network("net-100", 100, "dc1", "pod1", None);
        let lease = create_test_lease("lease-1", 4, 1, "2024-01-01T00:00:00Z");

        assert!(matches!(
            render_env_vars(&lease, &pool, &network),
            Err(ControllerError::EnvVars(_))
        ));
    }
}
