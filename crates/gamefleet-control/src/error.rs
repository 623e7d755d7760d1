//! Error types for the fleet controller.
//!
//! The taxonomy separates failures by blast radius: provisioning failures are
//! abandoned for the current cycle and retried on the next, health check
//! failures downgrade a single instance, and allocation failures are
//! surfaced synchronously to the caller. None of them are fatal to the
//! control loop.

use gamefleet_core::{CoreError, InstanceId};
use gamefleet_provision::ProvisionError;
use thiserror::Error;

use crate::health::HealthCheckError;

/// A result type using `FleetError`.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Errors that can occur in fleet controller operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The allocator found no active instance to claim.
    #[error("no capacity available: the active pool is empty")]
    NoCapacityAvailable,

    /// The requested instance is not in the registry.
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// Provisioning backend error.
    #[error("provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// Per-instance health check error.
    #[error("health check error: {0}")]
    Health(#[from] HealthCheckError),

    /// Lifecycle state machine violation.
    #[error("lifecycle error: {0}")]
    State(#[from] CoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::NoCapacityAvailable => 503,
            Self::InstanceNotFound(_) => 404,
            Self::Provision(_) | Self::Health(_) => 502,
            Self::Config(_) => 400,
            Self::State(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    ///
    /// `NoCapacityAvailable` is retriable because the controller's upscale
    /// policy is expected to eventually resolve it.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NoCapacityAvailable | Self::Provision(_) | Self::Health(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(FleetError::NoCapacityAvailable.http_status_code(), 503);
        assert_eq!(
            FleetError::InstanceNotFound(InstanceId::new("gs-1")).http_status_code(),
            404
        );
        assert_eq!(
            FleetError::Config("bad margins".into()).http_status_code(),
            400
        );
        assert_eq!(FleetError::Internal("oops".into()).http_status_code(), 500);
    }

    #[test]
    fn retriable_errors() {
        assert!(FleetError::NoCapacityAvailable.is_retriable());
        assert!(!FleetError::Config("bad".into()).is_retriable());
        assert!(!FleetError::InstanceNotFound(InstanceId::new("gs-1")).is_retriable());
    }
}
