//! Resource allocation manager.

use super::quota::{ResourceLimits, ResourceQuota};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

// Absorbs float drift when many small CPU shares are summed.
const CPU_EPSILON: f64 = 1e-9;

/// Opaque handle for a granted allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationId(String);

impl AllocationId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of current resource usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Total CPU share reserved.
    pub cpu: f64,
    /// Total memory reserved in bytes.
    pub memory_bytes: u64,
    /// Total concurrent executions reserved.
    pub concurrent_executions: u32,
    /// Number of live allocations.
    pub allocation_count: usize,
    /// Per-allocation detail.
    pub allocations: HashMap<String, ResourceQuota>,
}

#[derive(Debug, Default)]
struct Totals {
    cpu: f64,
    memory_bytes: u64,
    concurrent_executions: u32,
}

impl Totals {
    fn add(&mut self, quota: &ResourceQuota) {
        self.cpu += quota.cpu;
        self.memory_bytes = self.memory_bytes.saturating_add(quota.memory_bytes);
        self.concurrent_executions = self
            .concurrent_executions
            .saturating_add(quota.max_concurrent_executions);
    }

    fn sub(&mut self, quota: &ResourceQuota) {
        self.cpu = (self.cpu - quota.cpu).max(0.0);
        self.memory_bytes = self.memory_bytes.saturating_sub(quota.memory_bytes);
        self.concurrent_executions = self
            .concurrent_executions
            .saturating_sub(quota.max_concurrent_executions);
    }

    fn fits(&self, extra: &ResourceQuota, limits: &ResourceLimits) -> bool {
        self.cpu + extra.cpu <= limits.cpu + CPU_EPSILON
            && self.memory_bytes.saturating_add(extra.memory_bytes) <= limits.memory_bytes
            && self
                .concurrent_executions
                .saturating_add(extra.max_concurrent_executions)
                <= limits.max_concurrent_executions
    }
}

#[derive(Debug, Default)]
struct State {
    totals: Totals,
    allocations: HashMap<AllocationId, ResourceQuota>,
}

/// Grants or denies resource reservations against global ceilings.
///
/// All bookkeeping happens under one mutex so the usage check and the update
/// are a single atomic step.
pub struct ResourceAllocationManager {
    limits: ResourceLimits,
    state: Mutex<State>,
}

impl Default for ResourceAllocationManager {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}

impl ResourceAllocationManager {
    /// Creates a manager with the given ceilings.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(State::default()),
        }
    }

    /// Returns the configured ceilings.
    #[must_use]
    pub const fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Reserves `quota` in full, or returns `None` if any ceiling would be exceeded.
    pub fn allocate(&self, quota: ResourceQuota) -> Option<AllocationId> {
        if quota.cpu < 0.0 {
            warn!(cpu = quota.cpu, "Rejecting allocation with negative cpu");
            return None;
        }

        let mut state = self.state.lock();
        if !state.totals.fits(&quota, &self.limits) {
            debug!(
                cpu = quota.cpu,
                memory_bytes = quota.memory_bytes,
                current_cpu = state.totals.cpu,
                "Allocation denied"
            );
            return None;
        }

        let id = AllocationId::generate();
        state.totals.add(&quota);
        state.allocations.insert(id.clone(), quota);
        debug!(allocation_id = %id, cpu = quota.cpu, "Allocation granted");
        Some(id)
    }

    /// Releases an allocation. Returns false for unknown ids.
    pub fn deallocate(&self, id: &AllocationId) -> bool {
        let mut state = self.state.lock();
        match state.allocations.remove(id) {
            Some(quota) => {
                state.totals.sub(&quota);
                debug!(allocation_id = %id, "Allocation released");
                true
            }
            None => false,
        }
    }

    /// Replaces the quota of an existing allocation.
    ///
    /// The check counts the old quota as still held, so a replacement can be
    /// refused even when swapping would fit.
    pub fn update_quota(&self, id: &AllocationId, new_quota: ResourceQuota) -> bool {
        let mut state = self.state.lock();
        let Some(old) = state.allocations.get(id).copied() else {
            return false;
        };

        if !state.totals.fits(&new_quota, &self.limits) {
            debug!(allocation_id = %id, "Quota update denied");
            return false;
        }

        state.totals.sub(&old);
        state.totals.add(&new_quota);
        state.allocations.insert(id.clone(), new_quota);
        true
    }

    /// Reserves `quota` and returns a guard that releases it on drop.
    pub fn allocate_guard(self: &Arc<Self>, quota: ResourceQuota) -> Option<AllocationGuard> {
        self.allocate(quota).map(|id| AllocationGuard {
            manager: Arc::clone(self),
            id,
        })
    }

    /// Returns a snapshot of current usage.
    #[must_use]
    pub fn current_usage(&self) -> ResourceUsage {
        let state = self.state.lock();
        ResourceUsage {
            cpu: state.totals.cpu,
            memory_bytes: state.totals.memory_bytes,
            concurrent_executions: state.totals.concurrent_executions,
            allocation_count: state.allocations.len(),
            allocations: state
                .allocations
                .iter()
                .map(|(id, q)| (id.0.clone(), *q))
                .collect(),
        }
    }
}

impl std::fmt::Debug for ResourceAllocationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ResourceAllocationManager")
            .field("limits", &self.limits)
            .field("allocation_count", &state.allocations.len())
            .field("cpu", &state.totals.cpu)
            .finish()
    }
}

/// Releases its allocation when dropped.
#[derive(Debug)]
pub struct AllocationGuard {
    manager: Arc<ResourceAllocationManager>,
    id: AllocationId,
}

impl AllocationGuard {
    /// Returns the underlying allocation id.
    #[must_use]
    pub const fn id(&self) -> &AllocationId {
        &self.id
    }
}

impl Drop for AllocationGuard {
    fn drop(&mut self) {
        self.manager.deallocate(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_cpu_over_ceiling_denied() {
        let manager = ResourceAllocationManager::default();
        assert!(manager.allocate(ResourceQuota::new(0.5, MIB)).is_some());
        assert!(manager.allocate(ResourceQuota::new(0.6, MIB)).is_none());

        let usage = manager.current_usage();
        assert!((usage.cpu - 0.5).abs() < 1e-9);
        assert_eq!(usage.allocation_count, 1);
    }

    #[test]
    fn test_memory_over_ceiling_denied() {
        let manager = ResourceAllocationManager::default();
        assert!(manager.allocate(ResourceQuota::new(0.1, 600 * MIB)).is_some());
        assert!(manager.allocate(ResourceQuota::new(0.1, 600 * MIB)).is_none());
    }

    #[test]
    fn test_concurrency_ceiling() {
        let manager = ResourceAllocationManager::new(ResourceLimits {
            max_concurrent_executions: 2,
            ..ResourceLimits::default()
        });
        let quota = ResourceQuota::new(0.0, 0);
        assert!(manager.allocate(quota).is_some());
        assert!(manager.allocate(quota).is_some());
        assert!(manager.allocate(quota).is_none());
    }

    #[test]
    fn test_many_small_cpu_shares_fill_exactly() {
        let manager = ResourceAllocationManager::default();
        for _ in 0..10 {
            assert!(manager.allocate(ResourceQuota::new(0.1, 0)).is_some());
        }
        assert!(manager.allocate(ResourceQuota::new(0.01, 0)).is_none());
    }

    #[test]
    fn test_deallocate_frees_capacity() {
        let manager = ResourceAllocationManager::default();
        let id = manager.allocate(ResourceQuota::new(0.8, 0)).unwrap();
        assert!(manager.allocate(ResourceQuota::new(0.5, 0)).is_none());

        assert!(manager.deallocate(&id));
        assert!(!manager.deallocate(&id));
        assert!(manager.allocate(ResourceQuota::new(0.5, 0)).is_some());
    }

    #[test]
    fn test_update_quota_counts_old_allocation() {
        let manager = ResourceAllocationManager::default();
        let id = manager.allocate(ResourceQuota::new(0.6, 0)).unwrap();

        // 0.6 held + 0.5 requested exceeds 1.0 even though 0.5 alone would fit.
        assert!(!manager.update_quota(&id, ResourceQuota::new(0.5, 0)));
        assert!(manager.update_quota(&id, ResourceQuota::new(0.3, 0)));

        let usage = manager.current_usage();
        assert!((usage.cpu - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_update_unknown_allocation() {
        let manager = ResourceAllocationManager::default();
        let bogus = AllocationId("missing".to_string());
        assert!(!manager.update_quota(&bogus, ResourceQuota::new(0.1, 0)));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let manager = Arc::new(ResourceAllocationManager::default());
        {
            let guard = manager.allocate_guard(ResourceQuota::new(0.9, 0)).unwrap();
            assert!(!guard.id().as_str().is_empty());
            assert_eq!(manager.current_usage().allocation_count, 1);
        }
        assert_eq!(manager.current_usage().allocation_count, 0);
        assert!(manager.current_usage().cpu.abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_allocations_never_exceed_ceiling() {
        let manager = Arc::new(ResourceAllocationManager::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let m = manager.clone();
                std::thread::spawn(move || m.allocate(ResourceQuota::new(0.25, 0)).is_some())
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 4);
        assert!(manager.current_usage().cpu <= 1.0 + 1e-9);
    }
}
