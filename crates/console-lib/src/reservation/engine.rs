//! Reservation engine
//!
//! Runs the capacity, reservation and usage queries for one scope. Capacity
//! gates the other two: nothing is requested until at least one capacity
//! entry is known.

use super::summary::{combine, DisplaySummary};
use super::ResourceSource;
use crate::capabilities::{permissions, Capabilities};
use crate::error::ConsoleError;
use crate::models::{NodeCapacity, Scope, UsageSample, WorkloadRequests};
use crate::observability::ConsoleLogger;
use crate::units::{memory_mb, non_negative, parse_cpu_cores, parse_memory_mb, round_to};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// CPU in cores and memory in megabytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceFigure {
    pub cpu: f64,
    pub memory: f64,
}

impl ResourceFigure {
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self {
            cpu: non_negative(cpu),
            memory: non_negative(memory),
        }
    }
}

/// Normalized allocatable resources of one capacity entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapacityEntry {
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
}

/// Capacity of a scope, summed over its entries
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterCapacity {
    pub entries: Vec<CapacityEntry>,
    pub cpu_limit: f64,
    pub memory_limit: f64,
}

impl ClusterCapacity {
    /// Normalize and sum raw capacity entries
    pub fn from_nodes(nodes: &[NodeCapacity]) -> Self {
        let entries: Vec<CapacityEntry> = nodes
            .iter()
            .map(|node| CapacityEntry {
                name: node.name.clone(),
                cpu: parse_cpu_cores(&node.cpu),
                memory: parse_memory_mb(&node.memory),
            })
            .collect();

        let cpu_limit = round_to(entries.iter().map(|e| e.cpu).sum(), 3);
        let memory_limit = entries.iter().map(|e| e.memory).sum();

        Self {
            entries,
            cpu_limit,
            memory_limit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limits(&self) -> ResourceFigure {
        ResourceFigure::new(self.cpu_limit, self.memory_limit)
    }
}

/// Live usage, with flags distinguishing "not applicable" from "failed"
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageFigure {
    pub cpu: f64,
    pub memory: f64,
    /// False when the metrics backend is disabled or the caller is not authorized
    pub available: bool,
    /// True when a fetch was attempted and failed
    pub errored: bool,
}

impl UsageFigure {
    pub fn not_applicable() -> Self {
        Self::default()
    }

    pub fn failed() -> Self {
        Self {
            available: true,
            errored: true,
            ..Self::default()
        }
    }

    fn pending() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    fn from_samples(samples: &[UsageSample]) -> Self {
        let cpu: f64 = samples.iter().map(|s| parse_cpu_cores(&s.cpu)).sum();
        let memory: f64 = samples.iter().map(|s| parse_memory_mb(&s.memory)).sum();
        Self {
            cpu: round_to(cpu, 3),
            memory,
            available: true,
            errored: false,
        }
    }

    pub fn figure(&self) -> ResourceFigure {
        ResourceFigure::new(self.cpu, self.memory)
    }
}

/// Result of running all three queries once
#[derive(Debug)]
pub struct ReservationSnapshot {
    pub scope: Scope,
    /// Capacity in effect: the fresh value, or the last known good one
    pub capacity: Option<ClusterCapacity>,
    pub reservation: ResourceFigure,
    pub usage: UsageFigure,
    pub errors: Vec<ConsoleError>,
}

impl ReservationSnapshot {
    pub fn limits(&self) -> ResourceFigure {
        self.capacity
            .as_ref()
            .map(ClusterCapacity::limits)
            .unwrap_or_default()
    }

    pub fn summary(&self) -> DisplaySummary {
        combine(&self.limits(), &self.reservation, &self.usage)
    }
}

/// Aggregates capacity, reservation and usage for a single scope
pub struct ReservationEngine {
    source: Arc<dyn ResourceSource>,
    capabilities: Arc<dyn Capabilities>,
    scope: Scope,
    /// Last successfully fetched capacity
    capacity: Option<ClusterCapacity>,
    logger: ConsoleLogger,
}

impl ReservationEngine {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        capabilities: Arc<dyn Capabilities>,
        scope: Scope,
    ) -> Self {
        Self {
            source,
            capabilities,
            scope,
            capacity: None,
            logger: ConsoleLogger::default(),
        }
    }

    pub fn with_logger(mut self, logger: ConsoleLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Last known capacity, if any fetch has succeeded
    pub fn capacity(&self) -> Option<&ClusterCapacity> {
        self.capacity.as_ref()
    }

    fn capacity_known(&self) -> bool {
        self.capacity.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
    }

    /// Fetch and sum capacity. On failure the cached value is kept.
    pub async fn fetch_capacity(&mut self) -> Result<ClusterCapacity, ConsoleError> {
        match self.source.capacity(&self.scope).await {
            Ok(nodes) => {
                let capacity = ClusterCapacity::from_nodes(&nodes);
                debug!(
                    scope = %self.scope,
                    entries = capacity.entries.len(),
                    cpu_limit = capacity.cpu_limit,
                    memory_limit = capacity.memory_limit,
                    "Capacity aggregated"
                );
                self.capacity = Some(capacity.clone());
                Ok(capacity)
            }
            Err(e) => {
                let message = ConsoleError::chain(&e);
                self.logger
                    .log_fetch_failure("capacity", &self.scope, &message, false);
                Err(ConsoleError::Capacity(message))
            }
        }
    }

    /// Fetch the reservation figure; `None` while capacity is unknown
    pub async fn fetch_reservation(&self) -> Result<Option<ResourceFigure>, ConsoleError> {
        if !self.capacity_known() {
            self.logger
                .log_fetch_skipped("reservation", &self.scope, "capacity unknown");
            return Ok(None);
        }

        match self.source.workload_requests(&self.scope).await {
            Ok(requests) => Ok(Some(reservation_figure(&requests))),
            Err(e) => {
                let message = ConsoleError::chain(&e);
                self.logger
                    .log_fetch_failure("reservation", &self.scope, &message, false);
                Err(ConsoleError::Reservation(message))
            }
        }
    }

    /// Fetch live usage when the metrics backend is enabled and the caller authorized
    pub async fn fetch_usage(&self, enabled: bool, authorized: bool) -> UsageFigure {
        self.usage_outcome(enabled, authorized).await.0
    }

    async fn usage_outcome(
        &self,
        enabled: bool,
        authorized: bool,
    ) -> (UsageFigure, Option<ConsoleError>) {
        if !enabled || !authorized {
            self.logger.log_fetch_skipped(
                "usage",
                &self.scope,
                if enabled { "not authorized" } else { "metrics disabled" },
            );
            return (UsageFigure::not_applicable(), None);
        }

        if !self.capacity_known() {
            self.logger
                .log_fetch_skipped("usage", &self.scope, "capacity unknown");
            return (UsageFigure::pending(), None);
        }

        match self.source.usage(&self.scope).await {
            Ok(samples) => (UsageFigure::from_samples(&samples), None),
            Err(e) => {
                let message = ConsoleError::chain(&e);
                self.logger
                    .log_fetch_failure("usage", &self.scope, &message, true);
                (UsageFigure::failed(), Some(ConsoleError::Usage(message)))
            }
        }
    }

    /// Run capacity, then reservation and usage concurrently
    pub async fn snapshot(&mut self) -> ReservationSnapshot {
        let mut errors = Vec::new();

        if let Err(e) = self.fetch_capacity().await {
            errors.push(e);
        }

        let enabled = self.capabilities.server_metrics_enabled();
        // Node metrics need node read access; namespace metrics do not
        let authorized = match self.scope {
            Scope::Cluster => self
                .capabilities
                .is_authorized(permissions::CLUSTER_NODE_READ),
            Scope::Namespace(_) => true,
        };

        let (reservation, (usage, usage_error)) = tokio::join!(
            self.fetch_reservation(),
            self.usage_outcome(enabled, authorized)
        );

        let reservation = match reservation {
            Ok(figure) => figure.unwrap_or_default(),
            Err(e) => {
                errors.push(e);
                ResourceFigure::default()
            }
        };
        errors.extend(usage_error);

        ReservationSnapshot {
            scope: self.scope.clone(),
            capacity: self.capacity.clone(),
            reservation,
            usage,
            errors,
        }
    }
}

fn reservation_figure(requests: &WorkloadRequests) -> ResourceFigure {
    ResourceFigure::new(
        non_negative(requests.cpu_request) / 1000.0,
        memory_mb(&requests.memory_request),
    )
}
