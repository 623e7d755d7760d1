//! Core types and utilities for gamefleet.
//!
//! This crate provides the foundational types used throughout the gamefleet
//! autoscaler:
//!
//! - **Identifiers**: the opaque, provisioner-assigned [`InstanceId`]
//! - **Lifecycle**: the [`InstanceState`] enumeration and its transition table
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use gamefleet_core::{InstanceId, InstanceState, state};
//!
//! let id = InstanceId::new("gs-0a1b2c3d");
//!
//! // Validate a lifecycle transition
//! let next = state::validate_transition(
//!     &id,
//!     InstanceState::Running,
//!     InstanceState::Standby,
//! ).unwrap();
//! assert_eq!(next, InstanceState::Standby);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod state;

pub use error::{CoreError, Result};
pub use ids::InstanceId;
pub use state::InstanceState;
