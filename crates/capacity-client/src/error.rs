//! Capacity store errors

use thiserror::Error;

/// Errors that can occur when reading or writing capacity resources
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object is missing a field required to address it (name, namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Update rejected by the backend (conflict, admission, injected failure)
    #[error("Update rejected: {0}")]
    Rejected(String),
}
