//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `environment_controller_reconciliations_total` - Total number of reconciliations
//! - `environment_controller_reconciliation_errors_total` - Total number of failed reconciliations
//! - `environment_controller_reconciliation_duration_seconds` - Duration of reconciliations
//! - `environment_controller_managed_resource_changes_total` - Creates/updates/deletes of derived resources, by `kind` and `change`
//! - `environment_controller_condition_writes_total` - Status condition writes, by `transition` (raise/resolve)
//! - `environment_controller_mapped_requests_total` - Reconcile requests produced by watches, by `source` kind
//! - `environment_controller_requeues_total` - Requeues, by `reason`

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "environment_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "environment_controller_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "environment_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static MANAGED_RESOURCE_CHANGES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "environment_controller_managed_resource_changes_total",
            "Total number of changes made to resources owned by the controller",
        ),
        &["kind", "change"],
    )
    .expect("Failed to create MANAGED_RESOURCE_CHANGES_TOTAL metric - this should never happen")
});

static CONDITION_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "environment_controller_condition_writes_total",
            "Total number of Environment status condition writes",
        ),
        &["transition"],
    )
    .expect("Failed to create CONDITION_WRITES_TOTAL metric - this should never happen")
});

static MAPPED_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "environment_controller_mapped_requests_total",
            "Total number of Environment reconcile requests produced from watched resources",
        ),
        &["source"],
    )
    .expect("Failed to create MAPPED_REQUESTS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "environment_controller_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
///
/// # Errors
///
/// Returns an error if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(MANAGED_RESOURCE_CHANGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONDITION_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(MAPPED_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_managed_resource_changes(kind: &str, change: &str) {
    MANAGED_RESOURCE_CHANGES_TOTAL
        .with_label_values(&[kind, change])
        .inc();
}

pub fn increment_condition_writes(transition: &str) {
    CONDITION_WRITES_TOTAL.with_label_values(&[transition]).inc();
}

pub fn increment_mapped_requests(source: &str, count: usize) {
    MAPPED_REQUESTS_TOTAL
        .with_label_values(&[source])
        .inc_by(count as u64);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}
