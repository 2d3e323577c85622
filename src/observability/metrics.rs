//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `site_manager_operator_reconciliations_total` - Total number of reconciliation passes
//! - `site_manager_operator_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `site_manager_operator_outcomes_total{outcome}` - Events handled, by outcome
//! - `site_manager_operator_deferred_events` - Events currently queued for redelivery
//! - `site_manager_operator_workload_restarts_total` - Service restarts requested
//! - `site_manager_operator_admin_bootstraps_total` - Operator credentials provisioned
//! - `site_manager_operator_admin_bootstrap_errors_total` - Failed provisioning attempts
//! - `site_manager_operator_certificate_writes_total` - TLS files rewritten in the workload
//! - `site_manager_operator_trust_refreshes_total` - Trust-store index rebuilds

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "site_manager_operator_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "site_manager_operator_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "site_manager_operator_outcomes_total",
            "Total number of handled events by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create OUTCOMES_TOTAL metric - this should never happen")
});

static DEFERRED_EVENTS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "site_manager_operator_deferred_events",
        "Number of events queued for redelivery",
    )
    .expect("Failed to create DEFERRED_EVENTS metric - this should never happen")
});

static WORKLOAD_RESTARTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "site_manager_operator_workload_restarts_total",
        "Total number of workload service restarts",
    )
    .expect("Failed to create WORKLOAD_RESTARTS_TOTAL metric - this should never happen")
});

static ADMIN_BOOTSTRAPS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "site_manager_operator_admin_bootstraps_total",
        "Total number of operator credentials provisioned",
    )
    .expect("Failed to create ADMIN_BOOTSTRAPS_TOTAL metric - this should never happen")
});

static ADMIN_BOOTSTRAP_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "site_manager_operator_admin_bootstrap_errors_total",
        "Total number of failed operator credential provisioning attempts",
    )
    .expect("Failed to create ADMIN_BOOTSTRAP_ERRORS_TOTAL metric - this should never happen")
});

static CERTIFICATE_WRITES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "site_manager_operator_certificate_writes_total",
        "Total number of TLS files written into the workload",
    )
    .expect("Failed to create CERTIFICATE_WRITES_TOTAL metric - this should never happen")
});

static TRUST_REFRESHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "site_manager_operator_trust_refreshes_total",
        "Total number of trust-store index rebuilds",
    )
    .expect("Failed to create TRUST_REFRESHES_TOTAL metric - this should never happen")
});

/// Register all metrics with the registry
///
/// # Errors
///
/// Returns an error if a metric is already registered.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEFERRED_EVENTS.clone()))?;
    REGISTRY.register(Box::new(WORKLOAD_RESTARTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMIN_BOOTSTRAPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ADMIN_BOOTSTRAP_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CERTIFICATE_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRUST_REFRESHES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// Count a handled event under its outcome kind (`applied`, `waiting`, `deferred`, `blocked`)
pub fn increment_outcome(outcome: &str) {
    OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_deferred_events(count: usize) {
    DEFERRED_EVENTS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_workload_restarts() {
    WORKLOAD_RESTARTS_TOTAL.inc();
}

pub fn increment_admin_bootstraps() {
    ADMIN_BOOTSTRAPS_TOTAL.inc();
}

pub fn increment_admin_bootstrap_errors() {
    ADMIN_BOOTSTRAP_ERRORS_TOTAL.inc();
}

pub fn increment_certificate_writes() {
    CERTIFICATE_WRITES_TOTAL.inc();
}

pub fn increment_trust_refreshes() {
    TRUST_REFRESHES_TOTAL.inc();
}

/// Text exposition of every registered metric
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
