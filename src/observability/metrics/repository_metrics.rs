//! # Repository Metrics
//!
//! Metrics for repository resolution, snapshots and the checksum cache.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec};
use std::sync::LazyLock;

static RESOLUTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_repository_resolutions_total",
            "Total number of repository resolutions by source type",
        ),
        &["type"],
    )
    .expect("Failed to create RESOLUTIONS_TOTAL metric - this should never happen")
});

static RESOLUTION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_repository_resolution_errors_total",
            "Total number of failed repository resolutions by source type",
        ),
        &["type"],
    )
    .expect("Failed to create RESOLUTION_ERRORS_TOTAL metric - this should never happen")
});

static RESOLUTION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "gateway_config_repository_resolution_duration_seconds",
            "Duration of repository resolution in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["type"],
    )
    .expect("Failed to create RESOLUTION_DURATION metric - this should never happen")
});

static SNAPSHOTS_SKIPPED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "gateway_config_snapshots_skipped_total",
        "Total number of repository snapshots not stored because they exceeded the size limit",
    )
    .expect("Failed to create SNAPSHOTS_SKIPPED_TOTAL metric - this should never happen")
});

static CACHE_HITS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_cache_hits_total",
            "Total number of sync attempts short-circuited by the checksum cache",
        ),
        &["domain"],
    )
    .expect("Failed to create CACHE_HITS_TOTAL metric - this should never happen")
});

pub(crate) fn register_repository_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RESOLUTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOLUTION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOLUTION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SNAPSHOTS_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_HITS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_resolutions(repository_type: &str) {
    RESOLUTIONS_TOTAL.with_label_values(&[repository_type]).inc();
}

pub fn increment_resolution_errors(repository_type: &str) {
    RESOLUTION_ERRORS_TOTAL
        .with_label_values(&[repository_type])
        .inc();
}

pub fn observe_resolution_duration(repository_type: &str, duration: f64) {
    RESOLUTION_DURATION
        .with_label_values(&[repository_type])
        .observe(duration);
}

pub fn increment_snapshots_skipped() {
    SNAPSHOTS_SKIPPED_TOTAL.inc();
}

pub fn increment_cache_hits(domain: &str) {
    CACHE_HITS_TOTAL.with_label_values(&[domain]).inc();
}
