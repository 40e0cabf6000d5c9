//! Pool CRD
//!
//! A unit of compute and network capacity tied to a vCenter site.

use crate::topology::Topology;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Desired capacity of a pool
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "vspherecapacitymanager.splat.io",
    version = "v1",
    kind = "Pool",
    namespaced,
    status = "PoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    /// Short, human-friendly pool name
    #[serde(default)]
    pub short_name: String,

    /// vCenter server address; correlates scheduled leases back to a site
    pub server: String,

    /// Failure domain region
    #[serde(default)]
    pub region: String,

    /// Failure domain zone
    #[serde(default)]
    pub zone: String,

    /// Compute, storage and candidate port groups of the pool
    pub topology: Topology,

    /// Total vCPUs
    pub vcpus: u32,

    /// Total memory in GiB
    pub memory: u32,

    /// Multiplier applied to `vcpus` before subtracting usage (e.g. "1.5")
    #[serde(default = "default_over_commit_ratio")]
    pub over_commit_ratio: String,

    /// Physical site identity used for shared network accounting
    #[serde(default)]
    pub site: PoolSite,

    /// Excluded pools are only used by leases that require them by name
    #[serde(default)]
    pub exclude: bool,

    /// Cordoned pools never receive new leases
    #[serde(default)]
    pub no_schedule: bool,
}

fn default_over_commit_ratio() -> String {
    "1.0".to_string()
}

/// (datacenter, pod) pair identifying the physical site hosting a pool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct PoolSite {
    /// Physical datacenter
    #[serde(default)]
    pub datacenter: String,

    /// Pod within the datacenter
    #[serde(default)]
    pub pod: String,
}

/// Observed capacity of a pool, recomputed on every lease reconcile
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// vCPUs left after overcommit and current leases
    #[serde(default)]
    pub vcpus_available: i64,

    /// Memory (GiB) left after current leases
    #[serde(default)]
    pub memory_available: i64,

    /// Topology port groups not in use anywhere on the pool's site
    #[serde(default)]
    pub network_available: i64,

    /// Number of live leases owning this pool
    #[serde(default)]
    pub lease_count: u32,
}

/// Rejected overcommit ratio text
#[derive(Debug, Error, PartialEq)]
pub enum OvercommitRatioError {
    /// Not a number
    #[error("overcommit ratio '{0}' is not a number")]
    NotANumber(String),

    /// Negative, NaN or infinite
    #[error("overcommit ratio '{0}' must be a finite value >= 0")]
    OutOfRange(String),
}

impl PoolSpec {
    /// Parses `over_commit_ratio` into a finite, non-negative multiplier.
    pub fn parse_over_commit_ratio(&self) -> Result<f64, OvercommitRatioError> {
        let text = self.over_commit_ratio.trim();
        let ratio = text
            .parse::<f64>()
            .map_err(|_parse| OvercommitRatioError::NotANumber(text.to_string()))?;
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(OvercommitRatioError::OutOfRange(text.to_string()));
        }
        Ok(ratio)
    }
}
