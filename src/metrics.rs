// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for pdns-sync.
//!
//! All metrics carry the namespace prefix `pdns_sync_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Track each phase of change-event reconciliation
//! - **Record Metrics** - Track derived-record mutations by type and operation
//! - **Error Metrics** - Track rejected events by reason code
//!
//! # Example
//!
//! ```rust
//! use pdns_sync::metrics::{gather_metrics, record_reconciliation_success};
//!
//! record_reconciliation_success("create", std::time::Duration::from_millis(3));
//! assert!(gather_metrics().unwrap().contains("pdns_sync_reconciliations_total"));
//! ```

use crate::constants::METRICS_NAMESPACE;
use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// Embedding services expose it through their own metrics endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliation phases by phase and status
///
/// Labels:
/// - `phase`: `create`, `update`, `delete` or `event` for the whole event
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliation phases by phase and status",
    );
    let counter = CounterVec::new(opts, &["phase", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation phases in seconds
///
/// Labels:
/// - `phase`: `create`, `update`, `delete` or `event`
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliation phases in seconds",
    )
    .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]);
    let histogram = HistogramVec::new(opts, &["phase"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of redelivered events that were skipped
pub static EVENTS_DEDUPLICATED_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    let counter = Counter::new(
        format!("{METRICS_NAMESPACE}_events_deduplicated_total"),
        "Total number of redelivered change events that were skipped",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Record Metrics
// ============================================================================

/// Total number of derived-record mutations
///
/// Labels:
/// - `record_type`: DNS record type (`A`, `PTR`, `MX`, ...)
/// - `operation`: `create`, `update` or `delete`
pub static RECORDS_MUTATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records_mutated_total"),
        "Total number of derived-record mutations by record type and operation",
    );
    let counter = CounterVec::new(opts, &["record_type", "operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of rejected change events
///
/// Labels:
/// - `reason`: Stable reason code (e.g. `HostnameNotFound`, `ConstraintViolation`)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of rejected change events by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation phase
///
/// # Arguments
/// * `phase` - The phase that completed (e.g., `create`)
/// * `duration` - Duration of the phase
pub fn record_reconciliation_success(phase: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[phase, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[phase])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation phase
///
/// # Arguments
/// * `phase` - The phase that failed
/// * `duration` - Duration of the phase before failure
pub fn record_reconciliation_error(phase: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[phase, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[phase])
        .observe(duration.as_secs_f64());
}

/// Record derived-record mutations
///
/// # Arguments
/// * `record_type` - DNS record type of the rows
/// * `operation` - `create`, `update` or `delete`
/// * `count` - Number of rows affected
pub fn record_mutation(record_type: &str, operation: &str, count: usize) {
    if count == 0 {
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    RECORDS_MUTATED_TOTAL
        .with_label_values(&[record_type, operation])
        .inc_by(count as f64);
}

/// Record a rejected event
pub fn record_error(reason: &str) {
    ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a skipped redelivery
pub fn record_deduplicated() {
    EVENTS_DEDUPLICATED_TOTAL.inc();
}

/// Gather all metrics in Prometheus text format
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let phase = "test-success";
        let duration = Duration::from_millis(5);

        record_reconciliation_success(phase, duration);

        let counter = RECONCILIATION_TOTAL.with_label_values(&[phase, "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[phase]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_reconciliation_error() {
        let phase = "test-error";

        record_reconciliation_error(phase, Duration::from_millis(2));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[phase, "error"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_record_mutation_counts_rows() {
        record_mutation("HINFO", "create", 3);
        record_mutation("HINFO", "create", 0);

        let counter = RECORDS_MUTATED_TOTAL.with_label_values(&["HINFO", "create"]);
        assert!((counter.get() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success("gather", Duration::from_millis(1));
        record_error("GatherTest");

        let metrics_text = gather_metrics().expect("gathering metrics should succeed");
        assert!(
            metrics_text.contains("pdns_sync_reconciliations_total"),
            "Metrics should contain reconciliation counter"
        );
        assert!(
            metrics_text.contains("pdns_sync_errors_total"),
            "Metrics should contain error counter"
        );
    }
}
