//! Admission control against global resource ceilings.
//!
//! Every execution reserves a [`ResourceQuota`] before it runs. The sum of all
//! live reservations never exceeds the configured [`ResourceLimits`].

mod manager;
mod quota;

pub use manager::{AllocationGuard, AllocationId, ResourceAllocationManager, ResourceUsage};
pub use quota::{ResourceLimits, ResourceQuota};
