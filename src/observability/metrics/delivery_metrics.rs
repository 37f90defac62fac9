//! # Delivery Metrics
//!
//! Metrics for bundle delivery to gateway fleets.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static DELIVERIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_deliveries_total",
            "Total number of bundle deliveries by strategy and outcome",
        ),
        &["strategy", "outcome"],
    )
    .expect("Failed to create DELIVERIES_TOTAL metric - this should never happen")
});

static DELIVERIES_SKIPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_deliveries_skipped_total",
            "Total number of deliveries skipped because the marker already matched",
        ),
        &["strategy"],
    )
    .expect("Failed to create DELIVERIES_SKIPPED_TOTAL metric - this should never happen")
});

static DELIVERY_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "gateway_config_delivery_duration_seconds",
            "Duration of a single bundle delivery in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["strategy"],
    )
    .expect("Failed to create DELIVERY_DURATION metric - this should never happen")
});

static NOTIFICATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_notifications_total",
            "Total number of delivery notifications sent",
        ),
        &["outcome"],
    )
    .expect("Failed to create NOTIFICATIONS_TOTAL metric - this should never happen")
});

pub(crate) fn register_delivery_metrics() -> Result<()> {
    REGISTRY.register(Box::new(DELIVERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DELIVERIES_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DELIVERY_DURATION.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATIONS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_deliveries(strategy: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    DELIVERIES_TOTAL
        .with_label_values(&[strategy, outcome])
        .inc();
}

pub fn increment_deliveries_skipped(strategy: &str) {
    DELIVERIES_SKIPPED_TOTAL.with_label_values(&[strategy]).inc();
}

pub fn observe_delivery_duration(strategy: &str, duration: f64) {
    DELIVERY_DURATION
        .with_label_values(&[strategy])
        .observe(duration);
}

pub fn increment_notifications(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    NOTIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
}
