//! Quota and ceiling types.

use serde::{Deserialize, Serialize};

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Resources requested by a single allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuota {
    /// CPU share as a fraction of one core.
    #[serde(default)]
    pub cpu: f64,
    /// Memory in bytes.
    #[serde(default)]
    pub memory_bytes: u64,
    /// Concurrent executions this allocation accounts for.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_executions: u32,
    /// Wall-clock limit for a single execution.
    #[serde(default = "default_max_execution_seconds")]
    pub max_execution_seconds: u64,
}

const fn default_concurrency() -> u32 {
    1
}

const fn default_max_execution_seconds() -> u64 {
    300
}

impl Default for ResourceQuota {
    fn default() -> Self {
        Self {
            cpu: 0.05,
            memory_bytes: 32 * MIB,
            max_concurrent_executions: default_concurrency(),
            max_execution_seconds: default_max_execution_seconds(),
        }
    }
}

impl ResourceQuota {
    /// Creates a quota with the given CPU and memory, one concurrent slot.
    #[must_use]
    pub const fn new(cpu: f64, memory_bytes: u64) -> Self {
        Self {
            cpu,
            memory_bytes,
            max_concurrent_executions: default_concurrency(),
            max_execution_seconds: default_max_execution_seconds(),
        }
    }

    /// Sets the concurrency budget.
    #[must_use]
    pub const fn with_concurrency(mut self, executions: u32) -> Self {
        self.max_concurrent_executions = executions;
        self
    }

    /// Sets the execution time limit.
    #[must_use]
    pub const fn with_max_execution_seconds(mut self, seconds: u64) -> Self {
        self.max_execution_seconds = seconds;
        self
    }
}

/// Global ceilings enforced by the allocation manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Total CPU share.
    #[serde(default = "default_cpu_ceiling")]
    pub cpu: f64,
    /// Total memory in bytes.
    #[serde(default = "default_memory_ceiling")]
    pub memory_bytes: u64,
    /// Total concurrent executions.
    #[serde(default = "default_concurrency_ceiling")]
    pub max_concurrent_executions: u32,
}

const fn default_cpu_ceiling() -> f64 {
    1.0
}

const fn default_memory_ceiling() -> u64 {
    GIB
}

const fn default_concurrency_ceiling() -> u32 {
    50
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu: default_cpu_ceiling(),
            memory_bytes: default_memory_ceiling(),
            max_concurrent_executions: default_concurrency_ceiling(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = ResourceLimits::default();
        assert!((limits.cpu - 1.0).abs() < f64::EPSILON);
        assert_eq!(limits.memory_bytes, 1024 * 1024 * 1024);
        assert_eq!(limits.max_concurrent_executions, 50);
    }

    #[test]
    fn test_quota_deserialize_defaults() {
        let quota: ResourceQuota = serde_json::from_str(r#"{"cpu": 0.25}"#).unwrap();
        assert!((quota.cpu - 0.25).abs() < f64::EPSILON);
        assert_eq!(quota.memory_bytes, 0);
        assert_eq!(quota.max_concurrent_executions, 1);
        assert_eq!(quota.max_execution_seconds, 300);
    }
}
