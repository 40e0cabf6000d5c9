//! Controller-specific error types.
//!
//! Admission outcomes (`NoMatchingPool`, `InsufficientNetworks`, `Delayed`)
//! are expected and recurring; the runtime requeues the lease with backoff.

use capacity_client::StoreError;
use thiserror::Error;

/// Errors that can occur in the Lease Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client construction failed
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Reading or writing Lease/Pool/Network objects failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No pool can host the lease right now
    #[error("No matching pool: {0}")]
    NoMatchingPool(String),

    /// Not enough free networks to make progress
    #[error("Insufficient networks available: {0}")]
    InsufficientNetworks(String),

    /// No sibling lease of the same job owns networks yet
    #[error("No common network found: {0}")]
    NoCommonNetwork(String),

    /// An older or partially served lease contends for the same pool
    #[error("Lease delayed: {0}")]
    Delayed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Environment variable rendering failed
    #[error("Environment variable rendering failed: {0}")]
    EnvVars(String),

    /// Metrics registry or endpoint failure
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl From<prometheus::Error> for ControllerError {
    fn from(e: prometheus::Error) -> Self {
        Self::Metrics(e.to_string())
    }
}
