//! Integration tests for the reservation engine
//!
//! These tests drive the engine with an in-memory source whose queries can
//! be made to fail and whose calls are counted.

use super::*;
use crate::capabilities::{permissions, StaticCapabilities};
use crate::error::{ConsoleError, Severity};
use crate::models::{NodeCapacity, Scope, UsageSample, WorkloadRequests};
use crate::units::NumberOrString;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock source for testing
struct MockSource {
    nodes: Vec<NodeCapacity>,
    requests: WorkloadRequests,
    usage: Vec<UsageSample>,
    fail_capacity: AtomicBool,
    fail_reservation: AtomicBool,
    fail_usage: AtomicBool,
    capacity_calls: AtomicUsize,
    reservation_calls: AtomicUsize,
    usage_calls: AtomicUsize,
}

impl MockSource {
    /// One node with 4 CPUs and 8Gi, 1 CPU and 2Gi reserved, 2 CPUs and 4Gi used
    fn single_node() -> Self {
        Self {
            nodes: vec![NodeCapacity {
                name: "node-1".to_string(),
                cpu: "4".to_string(),
                memory: "8Gi".to_string(),
            }],
            requests: WorkloadRequests {
                cpu_request: 1000.0,
                memory_request: NumberOrString::Text("2Gi".to_string()),
            },
            usage: vec![UsageSample {
                cpu: "2".to_string(),
                memory: "4Gi".to_string(),
            }],
            fail_capacity: AtomicBool::new(false),
            fail_reservation: AtomicBool::new(false),
            fail_usage: AtomicBool::new(false),
            capacity_calls: AtomicUsize::new(0),
            reservation_calls: AtomicUsize::new(0),
            usage_calls: AtomicUsize::new(0),
        }
    }

    fn empty() -> Self {
        Self {
            nodes: vec![],
            ..Self::single_node()
        }
    }
}

#[async_trait]
impl ResourceSource for MockSource {
    async fn capacity(&self, _scope: &Scope) -> Result<Vec<NodeCapacity>> {
        self.capacity_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_capacity.load(Ordering::SeqCst) {
            return Err(anyhow!("nodes unavailable"));
        }
        Ok(self.nodes.clone())
    }

    async fn workload_requests(&self, _scope: &Scope) -> Result<WorkloadRequests> {
        self.reservation_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reservation.load(Ordering::SeqCst) {
            return Err(anyhow!("applications_resources returned 500"));
        }
        Ok(self.requests.clone())
    }

    async fn usage(&self, _scope: &Scope) -> Result<Vec<UsageSample>> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_usage.load(Ordering::SeqCst) {
            return Err(anyhow!("metrics server not responding"));
        }
        Ok(self.usage.clone())
    }
}

fn engine(source: Arc<MockSource>, caps: StaticCapabilities) -> ReservationEngine {
    ReservationEngine::new(source, Arc::new(caps), Scope::Cluster)
}

#[tokio::test]
async fn test_full_snapshot_annotations() {
    let source = Arc::new(MockSource::single_node());
    let mut engine = engine(source.clone(), StaticCapabilities::admin(true));

    let snapshot = engine.snapshot().await;
    assert!(snapshot.errors.is_empty());

    let summary = snapshot.summary();
    assert_eq!(
        summary.bar(BarKind::MemoryReservation).unwrap().annotation,
        "2048 / 8192 MB - 25%"
    );
    assert_eq!(
        summary.bar(BarKind::MemoryUsage).unwrap().annotation,
        "4096 / 8192 MB - 50%"
    );
    assert_eq!(
        summary.bar(BarKind::CpuReservation).unwrap().annotation,
        "1 / 4 - 25%"
    );
    assert_eq!(summary.bar(BarKind::CpuUsage).unwrap().annotation, "2 / 4 - 50%");
    assert!(summary.warning.is_none());
}

#[tokio::test]
async fn test_unauthorized_usage_issues_no_request() {
    let source = Arc::new(MockSource::single_node());
    let caps = StaticCapabilities::with_permissions(true, [permissions::INGRESSES_WRITE]);
    let mut engine = engine(source.clone(), caps);

    let snapshot = engine.snapshot().await;

    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 0);
    assert_eq!(snapshot.usage, UsageFigure::not_applicable());
    assert!(!snapshot.usage.available);

    let summary = snapshot.summary();
    assert!(summary.bar(BarKind::MemoryUsage).is_none());
    assert!(summary.bar(BarKind::CpuUsage).is_none());
    assert!(summary.bar(BarKind::MemoryReservation).is_some());
}

#[tokio::test]
async fn test_namespace_usage_without_node_permission() {
    let source = Arc::new(MockSource::single_node());
    let caps = StaticCapabilities::with_permissions(true, [permissions::INGRESSES_WRITE]);
    let mut engine = ReservationEngine::new(
        source.clone(),
        Arc::new(caps),
        Scope::Namespace("web".to_string()),
    );

    let snapshot = engine.snapshot().await;

    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 1);
    assert!(snapshot.usage.available);
    assert_eq!(snapshot.usage.cpu, 2.0);
    assert!(snapshot.summary().bar(BarKind::CpuUsage).is_some());
}

#[tokio::test]
async fn test_fetch_usage_short_circuits() {
    let source = Arc::new(MockSource::single_node());
    let mut engine = engine(source.clone(), StaticCapabilities::admin(true));
    engine.fetch_capacity().await.unwrap();

    let usage = engine.fetch_usage(false, true).await;
    assert_eq!(usage, UsageFigure::not_applicable());
    let usage = engine.fetch_usage(true, false).await;
    assert_eq!(usage, UsageFigure::not_applicable());
    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 0);

    let usage = engine.fetch_usage(true, true).await;
    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 1);
    assert_eq!(usage.cpu, 2.0);
    assert_eq!(usage.memory, 4096.0);
}

#[tokio::test]
async fn test_usage_failure_is_degraded_only() {
    let source = Arc::new(MockSource::single_node());
    source.fail_usage.store(true, Ordering::SeqCst);
    let mut engine = engine(source.clone(), StaticCapabilities::admin(true));

    let snapshot = engine.snapshot().await;

    assert!(snapshot.usage.available);
    assert!(snapshot.usage.errored);
    assert_eq!(snapshot.reservation, ResourceFigure::new(1.0, 2048.0));
    assert_eq!(snapshot.limits(), ResourceFigure::new(4.0, 8192.0));

    assert_eq!(snapshot.errors.len(), 1);
    assert_eq!(snapshot.errors[0].severity(), Severity::RecoverableDegraded);

    let summary = snapshot.summary();
    assert_eq!(summary.bars.len(), 4);
    assert_eq!(summary.warning.as_deref(), Some(USAGE_WARNING));
}

#[tokio::test]
async fn test_metrics_disabled_hides_usage() {
    let source = Arc::new(MockSource::single_node());
    let mut engine = engine(source.clone(), StaticCapabilities::admin(false));

    let snapshot = engine.snapshot().await;
    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 0);
    assert_eq!(snapshot.summary().bars.len(), 2);
}

#[tokio::test]
async fn test_capacity_failure_blocks_bars() {
    let source = Arc::new(MockSource::single_node());
    source.fail_capacity.store(true, Ordering::SeqCst);
    let mut engine = engine(source.clone(), StaticCapabilities::admin(true));

    let snapshot = engine.snapshot().await;

    assert!(snapshot.capacity.is_none());
    assert_eq!(source.reservation_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 0);
    assert!(snapshot.summary().bars.is_empty());
    assert!(matches!(snapshot.errors[0], ConsoleError::Capacity(_)));
    assert_eq!(snapshot.errors[0].severity(), Severity::RecoverableBlocking);
}

#[tokio::test]
async fn test_capacity_failure_keeps_last_known_good() {
    let source = Arc::new(MockSource::single_node());
    let mut engine = engine(source.clone(), StaticCapabilities::admin(false));

    engine.fetch_capacity().await.unwrap();
    source.fail_capacity.store(true, Ordering::SeqCst);

    let result = engine.fetch_capacity().await;
    assert!(result.is_err());
    assert_eq!(engine.capacity().unwrap().cpu_limit, 4.0);

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.limits(), ResourceFigure::new(4.0, 8192.0));
    assert_eq!(snapshot.errors.len(), 1);
}

#[tokio::test]
async fn test_reservation_failure_only_suppresses_reservation() {
    let source = Arc::new(MockSource::single_node());
    source.fail_reservation.store(true, Ordering::SeqCst);
    let mut engine = engine(source.clone(), StaticCapabilities::admin(true));

    let snapshot = engine.snapshot().await;

    assert_eq!(snapshot.reservation, ResourceFigure::default());
    assert!(!snapshot.usage.errored);
    assert_eq!(snapshot.usage.cpu, 2.0);
    assert!(matches!(snapshot.errors[0], ConsoleError::Reservation(_)));
}

#[tokio::test]
async fn test_reservation_gated_on_capacity_entries() {
    let source = Arc::new(MockSource::empty());
    let mut engine = engine(source.clone(), StaticCapabilities::admin(true));

    let snapshot = engine.snapshot().await;

    assert_eq!(source.capacity_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.reservation_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.usage_calls.load(Ordering::SeqCst), 0);
    assert!(snapshot.errors.is_empty());
    assert!(snapshot.summary().bars.is_empty());
}

#[tokio::test]
async fn test_fetch_reservation_before_capacity_is_noop() {
    let source = Arc::new(MockSource::single_node());
    let engine = engine(source.clone(), StaticCapabilities::admin(true));

    assert!(engine.fetch_reservation().await.unwrap().is_none());
    assert_eq!(source.reservation_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_capacity_sums_nodes() {
    let capacity = ClusterCapacity::from_nodes(&[
        NodeCapacity {
            name: "a".into(),
            cpu: "3500m".into(),
            memory: "4Gi".into(),
        },
        NodeCapacity {
            name: "b".into(),
            cpu: "2".into(),
            memory: "2097152Ki".into(),
        },
        NodeCapacity {
            name: "broken".into(),
            cpu: "".into(),
            memory: "".into(),
        },
    ]);

    assert_eq!(capacity.entries.len(), 3);
    assert_eq!(capacity.cpu_limit, 5.5);
    assert_eq!(capacity.memory_limit, 6144.0);
}
