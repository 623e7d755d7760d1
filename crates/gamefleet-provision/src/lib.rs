//! Kubernetes provisioning backend for gamefleet instances.
//!
//! This crate provides the [`Provisioner`] trait and [`K8sProvisioner`]
//! implementation for creating and destroying game server pods in a
//! Kubernetes cluster. It handles:
//!
//! - Pod creation for new game server instances
//! - Bounded waits for an instance to reach the running state, resolving its
//!   network endpoint
//! - Pod destruction (idempotent on already-deleted pods)
//! - Listing existing fleet members for registry rebuild at process start
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gamefleet_provision::{K8sProvisioner, Provisioner, ProvisionerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProvisionerConfig::default();
//! let provisioner = K8sProvisioner::new(config).await?;
//!
//! // Create an instance and wait for it to come up
//! let instance_id = provisioner.create_instance().await?;
//! let endpoint = provisioner
//!     .await_running(&instance_id, Duration::from_secs(180))
//!     .await?;
//! println!("Instance {instance_id} is reachable at {endpoint}");
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! For testing without a real Kubernetes cluster, enable the `test-utils`
//! feature and use [`MockProvisioner`], which tracks instances in memory and
//! supports failure injection.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod pod;
pub mod provisioner;
pub mod types;

pub use error::{ProvisionError, Result};
pub use provisioner::{K8sProvisioner, Provisioner};
pub use types::ProvisionerConfig;

#[cfg(any(test, feature = "test-utils"))]
pub use provisioner::mock::MockProvisioner;
