//! # Recurring Job Scheduler
//!
//! A single, explicitly constructed scheduler shared across all Gateway
//! reconciliations. Each job is registered under a unique tag
//! (`<namespace>/<gateway>-<domain>`) and runs at its own interval.
//!
//! - Registering an existing tag is a no-op.
//! - A tag never has two running instances; a due job that is still running is
//!   skipped for that tick.
//! - A job may ask to be deregistered by returning [`JobOutcome::Deregister`].
//! - Job errors are logged and counted; the job stays registered and runs again
//!   on its next due tick.

mod job;

pub use job::{Job, JobOutcome};

use crate::observability::metrics;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

struct JobEntry {
    interval: Duration,
    next_run: Instant,
    running: Arc<AtomicBool>,
    job: Arc<dyn Job>,
}

impl std::fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEntry")
            .field("interval", &self.interval)
            .field("next_run", &self.next_run)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("domain", &self.job.domain())
            .finish()
    }
}

/// Resets the running flag of a tag when the job finishes, even on panic
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared recurring job scheduler
#[derive(Debug)]
pub struct Scheduler {
    jobs: RwLock<HashMap<String, JobEntry>>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(tick: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            tick,
        }
    }

    /// Register `job` under `tag`. Returns `false` when the tag already exists.
    ///
    /// A newly registered job is due on the next tick.
    pub async fn register(&self, tag: impl Into<String>, interval: Duration, job: Arc<dyn Job>) -> bool {
        let tag = tag.into();
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&tag) {
            debug!(tag = %tag, "Job already registered");
            return false;
        }
        info!(tag = %tag, interval_secs = interval.as_secs(), "Registering job");
        jobs.insert(
            tag,
            JobEntry {
                interval,
                next_run: Instant::now(),
                running: Arc::new(AtomicBool::new(false)),
                job,
            },
        );
        metrics::set_jobs_registered(jobs.len());
        true
    }

    /// Remove `tag`. A running instance finishes its current invocation.
    pub async fn deregister(&self, tag: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        let removed = jobs.remove(tag).is_some();
        if removed {
            info!(tag = %tag, "Deregistered job");
            metrics::set_jobs_registered(jobs.len());
        }
        removed
    }

    pub async fn is_registered(&self, tag: &str) -> bool {
        self.jobs.read().await.contains_key(tag)
    }

    pub async fn is_running(&self, tag: &str) -> bool {
        self.jobs
            .read()
            .await
            .get(tag)
            .is_some_and(|entry| entry.running.load(Ordering::Acquire))
    }

    /// All registered tags, sorted
    pub async fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Start `tag` immediately, ignoring its interval.
    ///
    /// Returns `None` when the tag is unknown or already running.
    pub async fn run_by_tag(self: &Arc<Self>, tag: &str) -> Option<JoinHandle<()>> {
        let (job, running) = {
            let mut jobs = self.jobs.write().await;
            let entry = jobs.get_mut(tag)?;
            if entry
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                debug!(tag = %tag, "Job already running, skipping");
                return None;
            }
            entry.next_run = Instant::now() + entry.interval;
            (Arc::clone(&entry.job), Arc::clone(&entry.running))
        };
        Some(self.spawn_job(tag.to_string(), job, running))
    }

    /// Start every job that is due and not running. Returns the spawned handles.
    pub async fn run_pending(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let now = Instant::now();
        let due: Vec<(String, Arc<dyn Job>, Arc<AtomicBool>)> = {
            let mut jobs = self.jobs.write().await;
            jobs.iter_mut()
                .filter(|(_, entry)| entry.next_run <= now)
                .filter_map(|(tag, entry)| {
                    entry
                        .running
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .ok()?;
                    entry.next_run = now + entry.interval;
                    Some((tag.clone(), Arc::clone(&entry.job), Arc::clone(&entry.running)))
                })
                .collect()
        };

        due.into_iter()
            .map(|(tag, job, running)| self.spawn_job(tag, job, running))
            .collect()
    }

    fn spawn_job(
        self: &Arc<Self>,
        tag: String,
        job: Arc<dyn Job>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let span = info_span!("scheduler.job", tag = %tag, domain = job.domain());
        tokio::spawn(
            async move {
                let _guard = RunningGuard(running);
                let domain = job.domain();
                let start = Instant::now();
                metrics::increment_job_runs(domain);

                match job.run().await {
                    Ok(JobOutcome::Continue) => {}
                    Ok(JobOutcome::Deregister) => {
                        scheduler.deregister(&tag).await;
                    }
                    Err(e) => {
                        metrics::increment_job_errors(domain, e.kind());
                        if e.is_transient() {
                            warn!(tag = %tag, error = %e, "Job failed, will retry on next tick");
                        } else {
                            error!(tag = %tag, error = %e, "Job failed with configuration error");
                        }
                    }
                }
                metrics::observe_job_duration(domain, start.elapsed().as_secs_f64());
            }
            .instrument(span),
        )
    }

    /// Tick loop. Runs until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(tick_ms = self.tick.as_millis(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_pending().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}
