//! The fleet control loop.
//!
//! One [`FleetController`] runs per process as a long-lived background task.
//! Each cycle it polls every instance's health endpoint, commits the
//! aggregate capacity, applies the scale decision, evicts closeable standby
//! instances, sleeps, and rechecks any instance that failed its poll. The
//! loop never returns and never panics on collaborator failures; every
//! per-instance error is logged and the cycle proceeds.
//!
//! All network calls (health polls, provisioning, destruction) happen outside
//! the registry lock; their results are applied through registry methods.

use std::sync::Arc;

use tracing::{debug, info, warn};

use gamefleet_core::InstanceId;
use gamefleet_provision::Provisioner;

use crate::health::HealthReporter;
use crate::instance::Instance;
use crate::registry::FleetRegistry;
use crate::types::FleetConfig;

/// The scaling decision for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    /// Aggregate capacity is below the upscale margin; add an instance.
    Up,
    /// Aggregate capacity is above the downscale margin; park an instance.
    Down,
    /// Aggregate capacity is within the operating band.
    Hold,
}

/// Pure scale policy: compare the committed aggregate against the margins.
///
/// Upscale takes priority. Downscale additionally requires more than one
/// active instance, so the fleet never reaches zero active capacity through
/// downscaling alone. The two branches are mutually exclusive whenever
/// `upscale_margin < downscale_margin`.
#[must_use]
pub fn decide(aggregate_capacity: u32, active_len: usize, config: &FleetConfig) -> ScaleAction {
    if aggregate_capacity < config.upscale_margin {
        ScaleAction::Up
    } else if aggregate_capacity > config.downscale_margin && active_len > 1 {
        ScaleAction::Down
    } else {
        ScaleAction::Hold
    }
}

/// The background controller that keeps the fleet inside its capacity band.
pub struct FleetController {
    registry: Arc<FleetRegistry>,
    provisioner: Arc<dyn Provisioner>,
    reporter: Arc<dyn HealthReporter>,
    config: FleetConfig,
}

impl FleetController {
    /// Create a new controller over the shared registry.
    pub fn new(
        registry: Arc<FleetRegistry>,
        provisioner: Arc<dyn Provisioner>,
        reporter: Arc<dyn HealthReporter>,
        config: FleetConfig,
    ) -> Self {
        Self {
            registry,
            provisioner,
            reporter,
            config,
        }
    }

    /// Rebuild the registry from instances already running at the
    /// provisioner.
    ///
    /// Called once at process start. A listing failure is logged and the
    /// fleet starts empty; the first cycle's upscale policy recovers from
    /// there. Instances that cannot be adopted are skipped.
    pub async fn bootstrap(&self) {
        let ids = match self.provisioner.list_instances().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Instance listing failed, starting with an empty fleet");
                return;
            }
        };

        info!(count = ids.len(), "Rebuilding registry from existing instances");

        for id in ids {
            match Instance::adopt(&*self.provisioner, id.clone(), self.config.provision_timeout)
                .await
            {
                Ok(instance) => {
                    info!(instance_id = %instance.id, address = %instance.address, "Adopted instance");
                    self.registry.insert_active(instance);
                }
                Err(e) => {
                    warn!(instance_id = %id, error = %e, "Skipping unadoptable instance");
                }
            }
        }
    }

    /// Run the control loop forever.
    pub async fn run(&self) {
        info!(
            upscale_margin = self.config.upscale_margin,
            downscale_margin = self.config.downscale_margin,
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Starting fleet control loop"
        );

        loop {
            let unresponsive = self.run_cycle().await;

            tokio::time::sleep(self.config.poll_interval).await;

            if !unresponsive.is_empty() {
                self.grace_recheck(unresponsive).await;
            }
        }
    }

    /// Execute the pre-sleep phases of one cycle: poll, commit, scale, evict.
    ///
    /// Returns the identifiers of instances whose poll failed this cycle;
    /// they get a second chance in [`FleetController::grace_recheck`] after
    /// the sleep.
    pub async fn run_cycle(&self) -> Vec<InstanceId> {
        let unresponsive = self.poll_fleet().await;

        let aggregate = self.registry.commit_aggregate();
        let active_len = self.registry.active_len();
        debug!(
            aggregate_capacity = aggregate,
            active = active_len,
            standby = self.registry.standby_len(),
            "Committed aggregate capacity"
        );

        match decide(aggregate, active_len, &self.config) {
            ScaleAction::Up => self.scale_up().await,
            ScaleAction::Down => self.scale_down(),
            ScaleAction::Hold => {}
        }

        self.evict_closeable().await;

        unresponsive
    }

    /// Poll every instance in both pools, applying reports and marking
    /// failures. Returns the instances that failed.
    async fn poll_fleet(&self) -> Vec<InstanceId> {
        let targets = self.registry.poll_targets();
        let mut unresponsive = Vec::new();

        for (id, address) in targets {
            match self.reporter.report(&address).await {
                Ok(report) => {
                    if !self.registry.apply_report(&id, &report) {
                        debug!(instance_id = %id, "Instance left the registry mid-poll");
                    }
                }
                Err(e) => {
                    warn!(instance_id = %id, error = %e, "Health check failed");
                    if self.registry.mark_unresponsive(&id) {
                        unresponsive.push(id);
                    }
                }
            }
        }

        unresponsive
    }

    /// Add capacity: recall the oldest standby instance if one exists,
    /// otherwise provision a new one. A provisioning failure is logged and
    /// not retried within the cycle.
    async fn scale_up(&self) {
        if let Some((id, capacity)) = self.registry.recall_standby() {
            info!(instance_id = %id, capacity, "Recalled standby instance");
            return;
        }

        match Instance::provision(&*self.provisioner, self.config.provision_timeout).await {
            Ok(instance) => {
                info!(
                    instance_id = %instance.id,
                    address = %instance.address,
                    "Provisioned new instance"
                );
                self.registry.insert_active(instance);
            }
            Err(e) => {
                warn!(error = %e, "Provisioning failed, will retry next cycle");
            }
        }
    }

    /// Shed capacity: park the active instance with the greatest capacity.
    fn scale_down(&self) {
        if let Some((id, capacity)) = self.registry.demote_max_active() {
            info!(instance_id = %id, capacity, "Moved instance to standby");
        }
    }

    /// Destroy every standby instance that reported it is ready to close.
    async fn evict_closeable(&self) {
        for instance in self.registry.take_closeable_standby() {
            info!(instance_id = %instance.id, "Evicting closeable standby instance");
            if let Err(e) = self.provisioner.destroy_instance(&instance.id).await {
                warn!(instance_id = %instance.id, error = %e, "Destroy failed");
            }
        }
    }

    /// Re-poll the instances that failed during the last cycle's poll phase.
    ///
    /// A second consecutive failure removes the instance from its pool and
    /// destroys it. A success applies the fresh report in place; normal
    /// polling picks the instance up next cycle.
    pub async fn grace_recheck(&self, unresponsive: Vec<InstanceId>) {
        for id in unresponsive {
            let Some(address) = self.registry.address_of(&id) else {
                continue;
            };

            match self.reporter.report(&address).await {
                Ok(report) => {
                    info!(instance_id = %id, "Instance recovered within grace period");
                    self.registry.apply_report(&id, &report);
                }
                Err(e) => {
                    warn!(
                        instance_id = %id,
                        error = %e,
                        "Second consecutive health failure, terminating"
                    );
                    if self.registry.remove(&id).is_some() {
                        if let Err(e) = self.provisioner.destroy_instance(&id).await {
                            warn!(instance_id = %id, error = %e, "Destroy failed");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::mock::MockHealthReporter;
    use crate::health::{HealthCheckError, HealthReport};
    use gamefleet_core::InstanceState;
    use gamefleet_provision::MockProvisioner;

    struct Fixture {
        registry: Arc<FleetRegistry>,
        provisioner: Arc<MockProvisioner>,
        reporter: Arc<MockHealthReporter>,
        controller: FleetController,
    }

    fn fixture(config: FleetConfig) -> Fixture {
        let registry = Arc::new(FleetRegistry::new());
        let provisioner = Arc::new(MockProvisioner::new());
        let reporter = Arc::new(MockHealthReporter::new());
        let controller = FleetController::new(
            Arc::clone(&registry),
            Arc::clone(&provisioner) as Arc<dyn Provisioner>,
            Arc::clone(&reporter) as Arc<dyn HealthReporter>,
            config,
        );
        Fixture {
            registry,
            provisioner,
            reporter,
            controller,
        }
    }

    fn ok_report(capacity: u32) -> crate::health::HealthResult {
        Ok(HealthReport {
            available_capacity: capacity,
            ready_to_close: false,
        })
    }

    fn closing_report(capacity: u32) -> crate::health::HealthResult {
        Ok(HealthReport {
            available_capacity: capacity,
            ready_to_close: true,
        })
    }

    fn failed_report() -> crate::health::HealthResult {
        Err(HealthCheckError::Unreachable("injected".to_string()))
    }

    /// Seed an instance at the provisioner and place it in the active pool.
    async fn seed_active(fx: &Fixture, endpoint: &str) -> InstanceId {
        let id = fx.provisioner.seed_instance(endpoint);
        let instance = Instance::adopt(
            &*fx.provisioner,
            id.clone(),
            std::time::Duration::from_secs(1),
        )
        .await
        .unwrap();
        fx.registry.insert_active(instance);
        id
    }

    #[test]
    fn decide_upscale_below_margin() {
        let config = FleetConfig::default(); // margins 2/10
        assert_eq!(decide(0, 1, &config), ScaleAction::Up);
        assert_eq!(decide(1, 5, &config), ScaleAction::Up);
        assert_eq!(decide(2, 1, &config), ScaleAction::Hold);
    }

    #[test]
    fn decide_downscale_above_margin_with_spare_instance() {
        let config = FleetConfig::default();
        assert_eq!(decide(11, 2, &config), ScaleAction::Down);
        assert_eq!(decide(17, 2, &config), ScaleAction::Down);
        assert_eq!(decide(10, 2, &config), ScaleAction::Hold);
    }

    #[test]
    fn decide_never_downscales_last_active() {
        let config = FleetConfig::default();
        assert_eq!(decide(50, 1, &config), ScaleAction::Hold);
        assert_eq!(decide(50, 0, &config), ScaleAction::Hold);
    }

    #[test]
    fn decide_band_holds() {
        let config = FleetConfig::default();
        for aggregate in 2..=10 {
            assert_eq!(decide(aggregate, 3, &config), ScaleAction::Hold);
        }
    }

    #[tokio::test]
    async fn cycle_commits_aggregate_with_failures_as_zero() {
        let fx = fixture(FleetConfig::default());
        seed_active(&fx, "10.0.1.1:7777").await;
        let failing = seed_active(&fx, "10.0.1.2:7777").await;

        fx.reporter.set_fallback("10.0.1.1:7777", ok_report(5));
        fx.reporter.set_fallback("10.0.1.2:7777", failed_report());

        let unresponsive = fx.controller.run_cycle().await;

        assert_eq!(fx.registry.aggregate_capacity(), 5);
        assert_eq!(unresponsive, vec![failing.clone()]);

        let active = fx.registry.list_active();
        let failed = active.iter().find(|i| i.id == failing).unwrap();
        assert_eq!(failed.state, InstanceState::Unresponsive);
        assert_eq!(failed.available_capacity, 0);
    }

    #[tokio::test]
    async fn upscale_provisions_when_standby_empty() {
        // Margins 2/10, one active instance reporting capacity 1.
        let fx = fixture(FleetConfig::default());
        seed_active(&fx, "10.0.1.1:7777").await;
        fx.reporter.set_fallback("10.0.1.1:7777", ok_report(1));

        fx.controller.run_cycle().await;

        assert_eq!(fx.registry.active_len(), 2);
        assert_eq!(fx.provisioner.live_count(), 2);
    }

    #[tokio::test]
    async fn upscale_prefers_standby_recall() {
        let fx = fixture(FleetConfig::default());
        seed_active(&fx, "10.0.1.1:7777").await;
        seed_active(&fx, "10.0.1.2:7777").await;
        fx.reporter.set_fallback("10.0.1.1:7777", ok_report(1));
        fx.reporter.set_fallback("10.0.1.2:7777", ok_report(0));

        // Park the second instance by hand.
        fx.registry.apply_report(
            &InstanceId::new("gs-mock-2"),
            &HealthReport {
                available_capacity: 3,
                ready_to_close: false,
            },
        );
        fx.registry.demote_max_active().unwrap();
        assert_eq!(fx.registry.standby_len(), 1);

        fx.controller.run_cycle().await;

        // Recalled instead of provisioning a third instance.
        assert_eq!(fx.registry.active_len(), 2);
        assert_eq!(fx.registry.standby_len(), 0);
        assert_eq!(fx.provisioner.live_count(), 2);
    }

    #[tokio::test]
    async fn downscale_parks_max_capacity_instance() {
        // Capacities 8 and 9; aggregate 17 > downscale margin 10.
        let fx = fixture(FleetConfig::default());
        seed_active(&fx, "10.0.1.1:7777").await;
        let big = seed_active(&fx, "10.0.1.2:7777").await;
        fx.reporter.set_fallback("10.0.1.1:7777", ok_report(8));
        fx.reporter.set_fallback("10.0.1.2:7777", ok_report(9));

        fx.controller.run_cycle().await;

        assert_eq!(fx.registry.active_len(), 1);
        assert_eq!(fx.registry.standby_len(), 1);
        assert_eq!(fx.registry.aggregate_capacity(), 8);

        let targets = fx.registry.poll_targets();
        // Standby is polled last.
        assert_eq!(targets.last().unwrap().0, big);
    }

    #[tokio::test]
    async fn closeable_standby_evicted_same_cycle() {
        let fx = fixture(FleetConfig::default());
        seed_active(&fx, "10.0.1.1:7777").await;
        let closing = seed_active(&fx, "10.0.1.2:7777").await;
        fx.reporter.set_fallback("10.0.1.1:7777", ok_report(5));
        fx.reporter.set_fallback("10.0.1.2:7777", closing_report(2));

        // Park the second instance so its ready_to_close matters.
        fx.registry.apply_report(
            &closing,
            &HealthReport {
                available_capacity: 1,
                ready_to_close: false,
            },
        );
        fx.registry.demote_max_active().unwrap();

        fx.controller.run_cycle().await;

        assert_eq!(fx.registry.standby_len(), 0);
        assert_eq!(fx.provisioner.destroyed(), vec![closing]);
        assert_eq!(fx.registry.active_len(), 1);
    }

    #[tokio::test]
    async fn grace_recheck_recovers_instance() {
        let fx = fixture(FleetConfig::default());
        let flaky = seed_active(&fx, "10.0.1.1:7777").await;
        seed_active(&fx, "10.0.1.2:7777").await;

        // First poll fails, the recheck succeeds.
        fx.reporter.script("10.0.1.1:7777", failed_report());
        fx.reporter.set_fallback("10.0.1.1:7777", ok_report(4));
        fx.reporter.set_fallback("10.0.1.2:7777", ok_report(5));

        let unresponsive = fx.controller.run_cycle().await;
        assert_eq!(unresponsive, vec![flaky.clone()]);

        fx.controller.grace_recheck(unresponsive).await;

        let active = fx.registry.list_active();
        let recovered = active.iter().find(|i| i.id == flaky).unwrap();
        assert_eq!(recovered.state, InstanceState::Running);
        assert_eq!(recovered.available_capacity, 4);
        assert!(fx.provisioner.destroyed().is_empty());
    }

    #[tokio::test]
    async fn grace_recheck_terminates_on_second_failure() {
        let fx = fixture(FleetConfig::default());
        let dead = seed_active(&fx, "10.0.1.1:7777").await;
        seed_active(&fx, "10.0.1.2:7777").await;

        fx.reporter.set_fallback("10.0.1.1:7777", failed_report());
        fx.reporter.set_fallback("10.0.1.2:7777", ok_report(5));

        let unresponsive = fx.controller.run_cycle().await;
        assert_eq!(unresponsive, vec![dead.clone()]);

        fx.controller.grace_recheck(unresponsive).await;

        assert_eq!(fx.registry.active_len(), 1);
        assert_eq!(fx.provisioner.destroyed(), vec![dead]);
    }

    #[tokio::test]
    async fn provisioning_failure_does_not_abort_cycle() {
        let fx = fixture(FleetConfig::default());
        seed_active(&fx, "10.0.1.1:7777").await;
        fx.reporter.set_fallback("10.0.1.1:7777", ok_report(0));
        fx.provisioner.set_fail_create(true);

        let unresponsive = fx.controller.run_cycle().await;

        // Upscale was attempted and failed; the fleet is unchanged and the
        // cycle completed normally.
        assert_eq!(fx.registry.active_len(), 1);
        assert!(unresponsive.is_empty());
    }

    #[tokio::test]
    async fn bootstrap_adopts_existing_instances() {
        let fx = fixture(FleetConfig::default());
        fx.provisioner.seed_instance("10.0.2.1:7777");
        fx.provisioner.seed_instance("10.0.2.2:7777");

        fx.controller.bootstrap().await;

        assert_eq!(fx.registry.active_len(), 2);
        let active = fx.registry.list_active();
        assert!(active.iter().all(|i| i.state == InstanceState::Running));
    }

    #[tokio::test]
    async fn bootstrap_with_empty_backend_starts_empty() {
        let fx = fixture(FleetConfig::default());
        fx.controller.bootstrap().await;
        assert_eq!(fx.registry.active_len(), 0);
    }
}
