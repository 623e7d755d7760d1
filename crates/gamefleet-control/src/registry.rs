//! The in-memory fleet registry.
//!
//! The registry holds the authoritative state of the fleet: the active pool,
//! the standby pool, and the committed aggregate capacity. It is shared
//! between the controller's loop and arbitrary concurrent allocator callers,
//! so every mutating and capacity-reading operation is serialized behind one
//! mutex. Network calls never happen under that lock; the controller polls
//! and provisions outside and applies the results through these methods.
//!
//! Invariant: an instance is a member of exactly one pool at any observation
//! point. Removal methods mark the instance `Terminated` before handing it
//! back, so a removed instance can never re-enter a pool.

use parking_lot::Mutex;
use tracing::warn;

use gamefleet_core::{InstanceId, InstanceState};

use crate::error::FleetError;
use crate::health::HealthReport;
use crate::instance::Instance;

/// Thread-safe registry of all known fleet instances.
#[derive(Default)]
pub struct FleetRegistry {
    inner: Mutex<Pools>,
}

#[derive(Default)]
struct Pools {
    active: Vec<Instance>,
    standby: Vec<Instance>,
    aggregate_capacity: u32,
}

/// Index of the first instance with the greatest capacity (first-max wins
/// ties), or `None` on an empty slice.
fn first_max_index(instances: &[Instance]) -> Option<usize> {
    if instances.is_empty() {
        return None;
    }

    let mut max_index = 0;
    for (index, instance) in instances.iter().enumerate().skip(1) {
        if instance.available_capacity > instances[max_index].available_capacity {
            max_index = index;
        }
    }
    Some(max_index)
}

impl FleetRegistry {
    /// Create a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Allocator read path
    // =========================================================================

    /// Claim the active instance with the greatest available capacity,
    /// decrementing its advertised capacity by one.
    ///
    /// Runs concurrently with the control loop; the returned snapshot may be
    /// stale by up to one poll interval.
    ///
    /// # Errors
    ///
    /// Returns `FleetError::NoCapacityAvailable` if the active pool is empty.
    pub fn allocate(&self) -> Result<Instance, FleetError> {
        let mut inner = self.inner.lock();

        let index = first_max_index(&inner.active).ok_or(FleetError::NoCapacityAvailable)?;
        let instance = &mut inner.active[index];
        instance.available_capacity = instance.available_capacity.saturating_sub(1);

        Ok(instance.clone())
    }

    /// Return a read-only snapshot of the active pool.
    #[must_use]
    pub fn list_active(&self) -> Vec<Instance> {
        self.inner.lock().active.clone()
    }

    /// The aggregate capacity committed by the last control cycle.
    #[must_use]
    pub fn aggregate_capacity(&self) -> u32 {
        self.inner.lock().aggregate_capacity
    }

    /// Number of instances in the active pool.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Number of instances in the standby pool.
    #[must_use]
    pub fn standby_len(&self) -> usize {
        self.inner.lock().standby.len()
    }

    // =========================================================================
    // Controller write path
    // =========================================================================

    /// Add a freshly constructed instance to the active pool.
    pub fn insert_active(&self, instance: Instance) {
        self.inner.lock().active.push(instance);
    }

    /// Identifiers and addresses of every known instance, active first.
    ///
    /// The controller polls these endpoints outside the lock.
    #[must_use]
    pub fn poll_targets(&self) -> Vec<(InstanceId, String)> {
        let inner = self.inner.lock();
        inner
            .active
            .iter()
            .chain(inner.standby.iter())
            .map(|i| (i.id.clone(), i.address.clone()))
            .collect()
    }

    /// Apply a successful health report to the named instance.
    ///
    /// Restores the pool's state if the instance was unresponsive. Returns
    /// false if the instance is no longer in either pool.
    pub fn apply_report(&self, instance_id: &InstanceId, report: &HealthReport) -> bool {
        let mut inner = self.inner.lock();

        if let Some(instance) = inner.active.iter_mut().find(|i| i.id == *instance_id) {
            if let Err(e) = instance.apply_report(report, InstanceState::Running) {
                warn!(instance_id = %instance_id, error = %e, "Ignoring health report");
            }
            return true;
        }
        if let Some(instance) = inner.standby.iter_mut().find(|i| i.id == *instance_id) {
            if let Err(e) = instance.apply_report(report, InstanceState::Standby) {
                warn!(instance_id = %instance_id, error = %e, "Ignoring health report");
            }
            return true;
        }
        false
    }

    /// Record a failed health check for the named instance: capacity drops
    /// to 0 and the instance is marked unresponsive in place.
    ///
    /// Returns false if the instance is no longer in either pool.
    pub fn mark_unresponsive(&self, instance_id: &InstanceId) -> bool {
        let mut inner = self.inner.lock();

        let pools = &mut *inner;
        let Some(instance) = pools
            .active
            .iter_mut()
            .chain(pools.standby.iter_mut())
            .find(|i| i.id == *instance_id)
        else {
            return false;
        };

        if let Err(e) = instance.mark_unresponsive() {
            warn!(instance_id = %instance_id, error = %e, "Cannot mark unresponsive");
        }
        true
    }

    /// Recompute and commit the aggregate capacity as the sum over the
    /// active pool, returning the committed value.
    ///
    /// Failed polls contributed 0 because `mark_unresponsive` already zeroed
    /// their capacity.
    pub fn commit_aggregate(&self) -> u32 {
        let mut inner = self.inner.lock();
        let total = inner.active.iter().map(|i| i.available_capacity).sum();
        inner.aggregate_capacity = total;
        total
    }

    /// Move the oldest standby instance back to the active pool, adding its
    /// capacity to the aggregate.
    ///
    /// Returns the recalled instance's id and capacity, or `None` if standby
    /// is empty.
    pub fn recall_standby(&self) -> Option<(InstanceId, u32)> {
        let mut inner = self.inner.lock();

        if inner.standby.is_empty() {
            return None;
        }
        let mut instance = inner.standby.remove(0);

        if let Err(e) = instance.transition(InstanceState::Running) {
            warn!(instance_id = %instance.id, error = %e, "Recall transition rejected");
        }
        let capacity = instance.available_capacity;
        let id = instance.id.clone();

        inner.aggregate_capacity += capacity;
        inner.active.push(instance);

        Some((id, capacity))
    }

    /// Move the active instance with the greatest capacity (first-max wins
    /// ties) to standby, subtracting its capacity from the aggregate.
    ///
    /// Never shrinks the active pool below one instance; returns `None`
    /// when that floor would be violated.
    pub fn demote_max_active(&self) -> Option<(InstanceId, u32)> {
        let mut inner = self.inner.lock();

        if inner.active.len() <= 1 {
            return None;
        }
        let index = first_max_index(&inner.active)?;
        let mut instance = inner.active.remove(index);

        if let Err(e) = instance.transition(InstanceState::Standby) {
            warn!(instance_id = %instance.id, error = %e, "Demote transition rejected");
        }
        let capacity = instance.available_capacity;
        let id = instance.id.clone();

        inner.aggregate_capacity = inner.aggregate_capacity.saturating_sub(capacity);
        inner.standby.push(instance);

        Some((id, capacity))
    }

    /// Remove every standby instance that reported `ready_to_close`, marking
    /// each `Terminated` and returning them for destruction outside the lock.
    pub fn take_closeable_standby(&self) -> Vec<Instance> {
        let mut inner = self.inner.lock();

        let mut kept = Vec::new();
        let mut closing = Vec::new();
        for mut instance in std::mem::take(&mut inner.standby) {
            if instance.ready_to_close {
                if let Err(e) = instance.transition(InstanceState::Terminated) {
                    warn!(instance_id = %instance.id, error = %e, "Eviction transition rejected");
                }
                closing.push(instance);
            } else {
                kept.push(instance);
            }
        }
        inner.standby = kept;

        closing
    }

    /// Remove the named instance from whichever pool holds it, marking it
    /// `Terminated`.
    ///
    /// Returns `None` if the instance is in neither pool.
    pub fn remove(&self, instance_id: &InstanceId) -> Option<Instance> {
        let mut inner = self.inner.lock();

        let mut instance = if let Some(i) = inner.active.iter().position(|i| i.id == *instance_id)
        {
            inner.active.remove(i)
        } else if let Some(i) = inner.standby.iter().position(|i| i.id == *instance_id) {
            inner.standby.remove(i)
        } else {
            return None;
        };

        if let Err(e) = instance.transition(InstanceState::Terminated) {
            warn!(instance_id = %instance_id, error = %e, "Removal transition rejected");
        }
        Some(instance)
    }

    /// Resolve the address of an instance still present in either pool.
    #[must_use]
    pub fn address_of(&self, instance_id: &InstanceId) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .active
            .iter()
            .chain(inner.standby.iter())
            .find(|i| i.id == *instance_id)
            .map(|i| i.address.clone())
    }
}
