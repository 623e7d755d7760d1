//! The managed instance entity.
//!
//! An [`Instance`] pairs the immutable identity handed out by the
//! provisioner (id, address) with the mutable runtime state the controller
//! maintains (lifecycle state, advertised capacity, close readiness, last
//! successful health check).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use gamefleet_core::{state, CoreError, InstanceId, InstanceState};
use gamefleet_provision::{ProvisionError, Provisioner};

use crate::health::HealthReport;

/// One managed game server instance.
///
/// `available_capacity` is advisory and weakly consistent: it is set by a
/// successful health report and decremented by an allocation, never both in
/// the same logical step, and may be stale by up to one poll interval.
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    /// Provisioner-assigned identifier; immutable.
    pub id: InstanceId,
    /// `host:port` reachable for health checks; immutable once resolved.
    pub address: String,
    /// Current lifecycle state.
    pub state: InstanceState,
    /// Last reported capacity, minus any allocations since.
    pub available_capacity: u32,
    /// Last reported close readiness; meaningful while in standby.
    pub ready_to_close: bool,
    /// Timestamp of the last successful health report.
    pub last_health_success: Option<DateTime<Utc>>,
}

impl Instance {
    /// Request a brand-new instance from the provisioner and wait for it to
    /// reach the running state.
    ///
    /// # Errors
    ///
    /// Returns a `ProvisionError` if creation fails or the instance does not
    /// come up within `timeout`. On error no `Instance` value exists, so a
    /// half-constructed instance can never reach the registry.
    pub async fn provision<P: Provisioner + ?Sized>(
        provisioner: &P,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        let id = provisioner.create_instance().await?;
        Self::adopt(provisioner, id, timeout).await
    }

    /// Build an `Instance` for an identifier that already exists at the
    /// provisioner, waiting for it to be running and resolving its address.
    ///
    /// Used both by [`Instance::provision`] and by the registry rebuild at
    /// process start.
    ///
    /// # Errors
    ///
    /// Returns a `ProvisionError` if the running wait or address resolution
    /// fails.
    pub async fn adopt<P: Provisioner + ?Sized>(
        provisioner: &P,
        id: InstanceId,
        timeout: Duration,
    ) -> Result<Self, ProvisionError> {
        let address = provisioner.await_running(&id, timeout).await?;

        // The bounded running wait above is the Provisioning phase; the
        // entity only becomes observable once it resolved to Running.
        Ok(Self {
            id,
            address,
            state: InstanceState::Running,
            available_capacity: 0,
            ready_to_close: false,
            last_health_success: None,
        })
    }

    /// Perform a validated lifecycle transition.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the state machine forbids it.
    pub fn transition(&mut self, to: InstanceState) -> Result<(), CoreError> {
        self.state = state::validate_transition(&self.id, self.state, to)?;
        Ok(())
    }

    /// Apply a successful health report, restoring `pool_state` if the
    /// instance was marked unresponsive.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the restore is illegal.
    pub fn apply_report(
        &mut self,
        report: &HealthReport,
        pool_state: InstanceState,
    ) -> Result<(), CoreError> {
        if self.state == InstanceState::Unresponsive {
            self.transition(pool_state)?;
        }
        self.available_capacity = report.available_capacity;
        self.ready_to_close = report.ready_to_close;
        self.last_health_success = Some(Utc::now());
        Ok(())
    }

    /// Record a failed health check.
    ///
    /// Capacity is forced to 0 so an unconfirmed instance never advertises
    /// capacity. Idempotent across consecutive failures.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the instance cannot be
    /// marked unresponsive from its current state.
    pub fn mark_unresponsive(&mut self) -> Result<(), CoreError> {
        self.available_capacity = 0;
        if self.state != InstanceState::Unresponsive {
            self.transition(InstanceState::Unresponsive)?;
        }
        Ok(())
    }
}
