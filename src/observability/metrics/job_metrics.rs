//! # Job Metrics
//!
//! Metrics for scheduler job runs.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, IntGauge};
use std::sync::LazyLock;

static JOB_RUNS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_job_runs_total",
            "Total number of scheduler job runs",
        ),
        &["domain"],
    )
    .expect("Failed to create JOB_RUNS_TOTAL metric - this should never happen")
});

static JOB_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "gateway_config_job_errors_total",
            "Total number of failed scheduler job runs",
        ),
        &["domain", "kind"],
    )
    .expect("Failed to create JOB_ERRORS_TOTAL metric - this should never happen")
});

static JOB_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "gateway_config_job_duration_seconds",
            "Duration of scheduler job runs in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["domain"],
    )
    .expect("Failed to create JOB_DURATION metric - this should never happen")
});

static JOBS_REGISTERED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "gateway_config_jobs_registered",
        "Current number of registered scheduler jobs",
    )
    .expect("Failed to create JOBS_REGISTERED metric - this should never happen")
});

pub(crate) fn register_job_metrics() -> Result<()> {
    REGISTRY.register(Box::new(JOB_RUNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOB_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOB_DURATION.clone()))?;
    REGISTRY.register(Box::new(JOBS_REGISTERED.clone()))?;
    Ok(())
}

pub fn increment_job_runs(domain: &str) {
    JOB_RUNS_TOTAL.with_label_values(&[domain]).inc();
}

/// `kind` is `transient` or `configuration`
pub fn increment_job_errors(domain: &str, kind: &str) {
    JOB_ERRORS_TOTAL.with_label_values(&[domain, kind]).inc();
}

pub fn observe_job_duration(domain: &str, duration: f64) {
    JOB_DURATION.with_label_values(&[domain]).observe(duration);
}

pub fn set_jobs_registered(count: usize) {
    JOBS_REGISTERED.set(i64::try_from(count).unwrap_or(i64::MAX));
}
