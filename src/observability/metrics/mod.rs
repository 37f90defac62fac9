//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `job_metrics` - Scheduler job runs, errors and durations
//! - `delivery_metrics` - Bundle deliveries, gate hits and notifications
//! - `repository_metrics` - Repository resolutions, snapshots and cache hits

pub mod delivery_metrics;
pub mod job_metrics;
pub mod registry;
pub mod repository_metrics;

pub use delivery_metrics::*;
pub use job_metrics::*;
pub use registry::*;
pub use repository_metrics::*;
