//! Gamefleet Control - Fleet Autoscaling and Allocation
//!
//! This crate implements the fleet controller for game server instances:
//!
//! - **Health polling**: a [`HealthReporter`] polls each instance's
//!   `/health/` endpoint for advertised capacity and close readiness
//! - **Registry**: the mutex-guarded [`FleetRegistry`] holds the active and
//!   standby pools and serves concurrent allocation requests
//! - **Control loop**: the [`FleetController`] keeps aggregate capacity
//!   inside the configured margin band, parking surplus instances in standby
//!   and giving unresponsive instances one grace interval before termination
//!
//! The provisioning backend lives in `gamefleet-provision`; shared identifier
//! and lifecycle types live in `gamefleet-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod controller;
pub mod error;
pub mod health;
pub mod instance;
pub mod registry;
pub mod types;

pub use controller::{decide, FleetController, ScaleAction};
pub use error::{FleetError, Result};
pub use health::{HealthCheckError, HealthReport, HealthReporter, HttpHealthReporter};
pub use instance::Instance;
pub use registry::FleetRegistry;
pub use types::FleetConfig;

#[cfg(any(test, feature = "test-utils"))]
pub use health::mock::MockHealthReporter;
