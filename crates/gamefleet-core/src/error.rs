//! Common error types for gamefleet.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::ids::InstanceId;
use crate::state::InstanceState;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the gamefleet system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The requested state transition is not allowed by the state machine.
    #[error(
        "invalid state transition for instance {instance_id}: cannot transition from {from:?} to {to:?}"
    )]
    InvalidTransition {
        /// The instance being transitioned.
        instance_id: InstanceId,
        /// The current state.
        from: InstanceState,
        /// The requested target state.
        to: InstanceState,
    },

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
