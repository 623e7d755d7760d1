//! Instance lifecycle state machine.
//!
//! This module defines the valid state transitions for managed instances and
//! provides validation logic so that illegal transitions are rejected at the
//! point where they would occur.
//!
//! # State Machine
//!
//! ```text
//!           ┌──────────────────┐
//!           │   Provisioning   │
//!           └────────┬─────────┘
//!                    │ (backend confirms running)
//!                    ▼
//!           ┌──────────────────┐  (downscale)   ┌──────────────────┐
//!           │     Running      │───────────────▶│     Standby      │
//!           │                  │◀───────────────│                  │
//!           └───┬──────────────┘   (recall)     └──────────┬───────┘
//!               │        ▲                          ▲      │
//!  (poll fails) │        │ (poll recovers)          │      │ (poll fails)
//!               ▼        │       (poll recovers)    │      ▼
//!           ┌────────────┴─────────────────────────┴───────────┐
//!           │                  Unresponsive                    │
//!           └───────────────────────┬──────────────────────────┘
//!                                   │ (grace period expires)
//!                                   ▼
//!                          ┌──────────────────┐
//!                          │    Terminated    │
//!                          └──────────────────┘
//! ```
//!
//! Termination is irreversible: every non-terminal state may transition to
//! `Terminated`, and `Terminated` has no outgoing edges.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::InstanceId;

/// Lifecycle state of a managed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Creation requested from the provisioner, not yet confirmed running.
    Provisioning,
    /// Confirmed running and eligible for allocations (when in the active pool).
    Running,
    /// Held in reserve after downscaling, not allocatable.
    Standby,
    /// Failed its most recent health check; awaiting the grace-period recheck.
    Unresponsive,
    /// Destroyed at the provisioner; terminal.
    Terminated,
}

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `CoreError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(
    instance_id: &InstanceId,
    from: InstanceState,
    to: InstanceState,
) -> Result<InstanceState> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(CoreError::InvalidTransition {
            instance_id: instance_id.clone(),
            from,
            to,
        })
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: InstanceState, to: InstanceState) -> bool {
    use InstanceState::{Provisioning, Running, Standby, Terminated, Unresponsive};

    matches!(
        (from, to),
        // Provisioning resolves to Running once the backend confirms
        (Provisioning, Running)
            // Running moves to Standby on downscale, Standby back on recall
            | (Running, Standby)
            | (Standby, Running)
            // A failed poll marks either pool state Unresponsive
            | (Running | Standby, Unresponsive)
            // A successful grace-period recheck restores the pool state
            | (Unresponsive, Running | Standby)
            // Every non-terminal state can be terminated
            | (Provisioning | Running | Standby | Unresponsive, Terminated)
    )
}

/// Returns the list of valid target states from the given state.
#[must_use]
pub fn valid_transitions_from(state: InstanceState) -> Vec<InstanceState> {
    use InstanceState::{Provisioning, Running, Standby, Terminated, Unresponsive};

    match state {
        Provisioning => vec![Running, Terminated],
        Running => vec![Standby, Unresponsive, Terminated],
        Standby => vec![Running, Unresponsive, Terminated],
        Unresponsive => vec![Running, Standby, Terminated],
        Terminated => vec![],
    }
}

/// Returns true if the state permits new allocations.
#[must_use]
pub const fn is_allocatable(state: InstanceState) -> bool {
    matches!(state, InstanceState::Running)
}

/// Returns true if the state is terminal.
#[must_use]
pub const fn is_terminal(state: InstanceState) -> bool {
    matches!(state, InstanceState::Terminated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use InstanceState::*;

        // Provisioning -> Running (backend confirmed)
        assert!(is_valid_transition(Provisioning, Running));
        // Running -> Standby (downscale)
        assert!(is_valid_transition(Running, Standby));
        // Standby -> Running (recall)
        assert!(is_valid_transition(Standby, Running));
        // Failed poll from either pool
        assert!(is_valid_transition(Running, Unresponsive));
        assert!(is_valid_transition(Standby, Unresponsive));
        // Grace-period recovery
        assert!(is_valid_transition(Unresponsive, Running));
        assert!(is_valid_transition(Unresponsive, Standby));
        // Termination from anywhere non-terminal
        assert!(is_valid_transition(Provisioning, Terminated));
        assert!(is_valid_transition(Running, Terminated));
        assert!(is_valid_transition(Standby, Terminated));
        assert!(is_valid_transition(Unresponsive, Terminated));
    }

    #[test]
    fn invalid_transitions() {
        use InstanceState::*;

        // Termination is irreversible
        assert!(!is_valid_transition(Terminated, Running));
        assert!(!is_valid_transition(Terminated, Standby));
        assert!(!is_valid_transition(Terminated, Provisioning));
        // Can't re-enter Provisioning
        assert!(!is_valid_transition(Running, Provisioning));
        assert!(!is_valid_transition(Standby, Provisioning));
        // Provisioning can't be parked or marked unresponsive
        assert!(!is_valid_transition(Provisioning, Standby));
        assert!(!is_valid_transition(Provisioning, Unresponsive));
    }

    #[test]
    fn validate_transition_ok() {
        let id = InstanceId::new("gs-1");
        let result = validate_transition(&id, InstanceState::Running, InstanceState::Standby);
        assert_eq!(result.unwrap(), InstanceState::Standby);
    }

    #[test]
    fn validate_transition_err() {
        let id = InstanceId::new("gs-1");
        let result = validate_transition(&id, InstanceState::Terminated, InstanceState::Running);

        match result {
            Err(CoreError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, InstanceState::Terminated);
                assert_eq!(to, InstanceState::Running);
            }
            _ => panic!("expected InvalidTransition error"),
        }
    }

    #[test]
    fn allocatability() {
        assert!(is_allocatable(InstanceState::Running));
        assert!(!is_allocatable(InstanceState::Provisioning));
        assert!(!is_allocatable(InstanceState::Standby));
        assert!(!is_allocatable(InstanceState::Unresponsive));
        assert!(!is_allocatable(InstanceState::Terminated));
    }

    #[test]
    fn terminal_states() {
        assert!(is_terminal(InstanceState::Terminated));
        assert!(!is_terminal(InstanceState::Running));
        assert!(!is_terminal(InstanceState::Unresponsive));
    }

    #[test]
    fn valid_transitions_from_terminated_is_empty() {
        assert!(valid_transitions_from(InstanceState::Terminated).is_empty());
    }

    #[test]
    fn valid_transitions_from_unresponsive() {
        let transitions = valid_transitions_from(InstanceState::Unresponsive);
        assert!(transitions.contains(&InstanceState::Running));
        assert!(transitions.contains(&InstanceState::Standby));
        assert!(transitions.contains(&InstanceState::Terminated));
        assert!(!transitions.contains(&InstanceState::Provisioning));
    }

    #[test]
    fn state_serde_snake_case() {
        let json = serde_json::to_string(&InstanceState::Unresponsive).unwrap();
        assert_eq!(json, "\"unresponsive\"");
        let parsed: InstanceState = serde_json::from_str("\"standby\"").unwrap();
        assert_eq!(parsed, InstanceState::Standby);
    }
}
