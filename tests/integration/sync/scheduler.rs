//! Scheduler: tag uniqueness, single running instance, deregistration.

use async_trait::async_trait;
use gateway_config_controller::error::SyncError;
use gateway_config_controller::scheduler::{Job, JobOutcome, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Counts invocations and waits for a release before finishing
struct BlockingJob {
    runs: AtomicUsize,
    release: Notify,
}

#[async_trait]
impl Job for BlockingJob {
    fn domain(&self) -> &'static str {
        "blocking"
    }

    async fn run(&self) -> Result<JobOutcome, SyncError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(JobOutcome::Continue)
    }
}

/// Returns a fixed outcome
struct FixedJob {
    runs: AtomicUsize,
    fail: bool,
    outcome: JobOutcome,
}

impl FixedJob {
    fn new(outcome: JobOutcome, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            fail,
            outcome,
        })
    }
}

#[async_trait]
impl Job for FixedJob {
    fn domain(&self) -> &'static str {
        "fixed"
    }

    async fn run(&self) -> Result<JobOutcome, SyncError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SyncError::transient("gateway unavailable"));
        }
        Ok(self.outcome)
    }
}

#[tokio::test]
async fn test_run_by_tag_skips_running_job() {
    let scheduler = Arc::new(Scheduler::new(Duration::from_millis(10)));
    let job = Arc::new(BlockingJob {
        runs: AtomicUsize::new(0),
        release: Notify::new(),
    });
    scheduler
        .register("gateways/ssg-repositories", Duration::from_secs(60), job.clone())
        .await;

    let handle = scheduler
        .run_by_tag("gateways/ssg-repositories")
        .await
        .expect("first run starts");
    assert!(scheduler.is_running("gateways/ssg-repositories").await);
    assert!(scheduler.run_by_tag("gateways/ssg-repositories").await.is_none());
    assert!(scheduler.run_pending().await.is_empty());

    job.release.notify_one();
    handle.await.unwrap();
    assert!(!scheduler.is_running("gateways/ssg-repositories").await);
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_registration_is_ignored() {
    let scheduler = Scheduler::new(Duration::from_millis(10));
    let first = FixedJob::new(JobOutcome::Continue, false);
    let second = FixedJob::new(JobOutcome::Continue, false);

    assert!(scheduler.register("gateways/ssg-listen-ports", Duration::from_secs(5), first).await);
    assert!(!scheduler.register("gateways/ssg-listen-ports", Duration::from_secs(5), second).await);
    assert_eq!(scheduler.tags().await, vec!["gateways/ssg-listen-ports".to_string()]);
}

#[tokio::test]
async fn test_deregister_outcome_removes_job() {
    let scheduler = Arc::new(Scheduler::new(Duration::from_millis(10)));
    let job = FixedJob::new(JobOutcome::Deregister, false);
    scheduler
        .register("gateways/ssg-external-keys", Duration::from_secs(5), job.clone())
        .await;

    for handle in scheduler.run_pending().await {
        handle.await.unwrap();
    }

    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    assert!(!scheduler.is_registered("gateways/ssg-external-keys").await);
}

#[tokio::test]
async fn test_failed_job_stays_registered() {
    let scheduler = Arc::new(Scheduler::new(Duration::from_millis(10)));
    let job = FixedJob::new(JobOutcome::Continue, true);
    scheduler
        .register("gateways/ssg-cluster-properties", Duration::ZERO, job.clone())
        .await;

    for _ in 0..2 {
        for handle in scheduler.run_pending().await {
            handle.await.unwrap();
        }
    }

    assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    assert!(scheduler.is_registered("gateways/ssg-cluster-properties").await);
}

#[tokio::test]
async fn test_interval_is_respected() {
    let scheduler = Arc::new(Scheduler::new(Duration::from_millis(10)));
    let job = FixedJob::new(JobOutcome::Continue, false);
    scheduler
        .register("gateways/ssg-otk-policies", Duration::from_secs(3600), job.clone())
        .await;

    for handle in scheduler.run_pending().await {
        handle.await.unwrap();
    }
    assert!(scheduler.run_pending().await.is_empty());
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tick_loop_stops_on_shutdown() {
    let scheduler = Arc::new(Scheduler::new(Duration::from_millis(5)));
    let job = FixedJob::new(JobOutcome::Continue, false);
    scheduler
        .register("gateways/ssg-management-pod", Duration::from_millis(5), job.clone())
        .await;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let running = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("scheduler stops")
        .unwrap();

    assert!(job.runs.load(Ordering::SeqCst) >= 1);
}
