//! Resource reservation aggregation
//!
//! This module provides:
//! - Capacity, reservation and usage queries against a [`ResourceSource`]
//! - Last-known-good capacity caching and partial-failure tolerance
//! - Pure combination of the three figures into display-ready bars

mod engine;
mod summary;

#[cfg(test)]
mod tests;

pub use engine::{
    CapacityEntry, ClusterCapacity, ReservationEngine, ReservationSnapshot, ResourceFigure,
    UsageFigure,
};
pub use summary::{
    combine, percentage, percentage_string, BarKind, DisplaySummary, Percentage, ResourceBar,
    USAGE_WARNING,
};

use crate::models::{NodeCapacity, Scope, UsageSample, WorkloadRequests};
use anyhow::Result;

pub use async_trait::async_trait;

/// Backend queries feeding the reservation engine
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Allocatable capacity entries in scope (nodes, or namespace quotas)
    async fn capacity(&self, scope: &Scope) -> Result<Vec<NodeCapacity>>;

    /// Resources requested by all running workloads in scope
    async fn workload_requests(&self, scope: &Scope) -> Result<WorkloadRequests>;

    /// Live usage samples in scope (nodes, or containers)
    async fn usage(&self, scope: &Scope) -> Result<Vec<UsageSample>>;
}
