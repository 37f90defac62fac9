//! Job contract run by the [`Scheduler`](super::Scheduler).

use crate::error::SyncError;
use async_trait::async_trait;

/// What the scheduler should do with a job after an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Keep the job registered
    Continue,
    /// The owning resource is gone or the feature was disabled
    Deregister,
}

/// A unit of recurring work
#[async_trait]
pub trait Job: Send + Sync {
    /// Low-cardinality name used in logs and metrics
    fn domain(&self) -> &'static str;

    async fn run(&self) -> Result<JobOutcome, SyncError>;
}
