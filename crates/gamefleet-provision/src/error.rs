//! Error types for the provisioning crate.

use thiserror::Error;

/// Errors that can occur during provisioning operations.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// Pod not found in the cluster.
    #[error("Pod not found: {0}")]
    PodNotFound(String),

    /// Timeout waiting for an instance to reach the running state.
    #[error("Timeout waiting for instance: {0}")]
    Timeout(String),

    /// The instance is running but no network address could be resolved.
    #[error("No network address for instance: {0}")]
    MissingAddress(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProvisionError {
    /// Check if this error is retriable on a later control cycle.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::KubeApi(_) | Self::Timeout(_) | Self::MissingAddress(_)
        )
    }
}

/// A specialized Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
