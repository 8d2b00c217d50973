use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pressroom_core::{
    CycleProgress, ErrorKind, EventKind, EventSink, PublishResult, StatusEvent,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, SchedulerError},
    schedule::{compute_next_run, validate_schedule},
    store::JobStore,
    types::{Cycle, Job, JobStatus, RunRecord, RunStatus},
};

const INTERRUPTED: &str = "interrupted by restart";

/// What a cycle produced, as reported by the executor.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Generation succeeded and every target reached a terminal state.
    Published {
        artifact_title: String,
        results: Vec<PublishResult>,
    },
    /// The generator failed; nothing was published.
    GenerationFailed { message: String },
}

/// Runs one job-cycle: generate, then publish to every target.
///
/// Finished target results should also be recorded in `progress` so they
/// survive if the cycle is abandoned mid-way.
#[async_trait]
pub trait CycleExecutor: Send + Sync {
    async fn execute(&self, cycle: Cycle, progress: CycleProgress) -> CycleOutcome;
}

/// Owns the job set. Every mutation is persisted to the [`JobStore`] before
/// the in-memory copy changes.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    jobs: Mutex<HashMap<String, Job>>,
    events: EventSink,
}

impl Scheduler {
    /// Load every job from `store`, closing out runs that a previous process
    /// left in flight.
    pub fn load(store: Arc<dyn JobStore>, events: EventSink) -> Result<Self> {
        let now = Utc::now();
        let mut jobs = HashMap::new();
        for mut job in store.load_all()? {
            if job.in_progress {
                recover_interrupted(store.as_ref(), &events, &mut job, now)?;
            }
            jobs.insert(job.id.clone(), job);
        }
        info!(jobs = jobs.len(), "scheduler loaded");
        Ok(Self {
            store,
            jobs: Mutex::new(jobs),
            events,
        })
    }

    /// Add a new job. `next_run_at` is computed from `job.created_at` unless
    /// already set.
    pub fn register(&self, mut job: Job) -> Result<Job> {
        if job.topics.is_empty() {
            return Err(SchedulerError::InvalidJob(format!(
                "job {} has no topics",
                job.id
            )));
        }
        if job.target_ids.is_empty() {
            return Err(SchedulerError::InvalidJob(format!(
                "job {} has no targets",
                job.id
            )));
        }
        validate_schedule(&job.schedule)?;

        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(SchedulerError::DuplicateJob { id: job.id });
        }
        if job.next_run_at.is_none() {
            job.next_run_at = compute_next_run(&job.schedule, job.created_at);
        }
        if job.next_run_at.is_none() {
            warn!(job_id = %job.id, "schedule has no future run; job will never fire");
        }
        job.in_progress = false;

        self.store.save(&job)?;
        info!(job_id = %job.id, name = %job.name, next_run_at = ?job.next_run_at, "job registered");
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut all: Vec<Job> = self.jobs.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Jobs that are active, idle and past their `next_run_at`, earliest first.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<Job> {
        let mut due: Vec<Job> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|j| j.next_run_at);
        due
    }

    pub fn pause(&self, job_id: &str) -> Result<Job> {
        self.set_status(job_id, JobStatus::Paused)
    }

    /// Resume a paused job. A window missed while paused fires once.
    pub fn resume(&self, job_id: &str) -> Result<Job> {
        self.set_status(job_id, JobStatus::Active)
    }

    pub fn runs(&self, job_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        if !self.jobs.lock().unwrap().contains_key(job_id) {
            return Err(SchedulerError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        self.store.runs(job_id, limit)
    }

    /// Claim a job for one cycle.
    ///
    /// Sets `in_progress`, advances `next_run_at` from `now` (so a long
    /// outage collapses into a single catch-up run) and rotates the topic
    /// cursor. The new state is persisted before the in-memory copy changes;
    /// on a store error the job is left exactly as it was.
    pub fn mark_running(&self, job_id: &str, now: DateTime<Utc>) -> Result<Cycle> {
        let mut jobs = self.jobs.lock().unwrap();
        let current = jobs
            .get(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound {
                id: job_id.to_string(),
            })?;
        if current.in_progress {
            return Err(SchedulerError::AlreadyRunning {
                id: job_id.to_string(),
            });
        }
        if current.status == JobStatus::Paused {
            return Err(SchedulerError::Paused {
                id: job_id.to_string(),
            });
        }

        let topic = current.next_topic().unwrap_or_default().to_string();
        let mut next = current.clone();
        next.in_progress = true;
        next.run_count += 1;
        next.topic_cursor = (next.topic_cursor + 1) % next.topics.len().max(1) as u32;
        next.last_run_at = Some(now);
        next.next_run_at = compute_next_run(&next.schedule, now);
        next.updated_at = now;

        self.store.save(&next)?;
        jobs.insert(next.id.clone(), next.clone());
        drop(jobs);

        info!(job_id, run = next.run_count, %topic, next_run_at = ?next.next_run_at, "job triggered");
        self.events.emit(
            StatusEvent::new(EventKind::JobTriggered, job_id, "running").with_detail(
                serde_json::json!({
                    "topic": topic,
                    "run": next.run_count,
                    "next_run_at": next.next_run_at,
                }),
            ),
        );

        Ok(Cycle {
            run_id: Uuid::new_v4().to_string(),
            job: next,
            topic,
            started_at: now,
        })
    }

    /// Close a cycle: append `run` to the history and clear `in_progress`.
    ///
    /// The in-memory flag is cleared even if the store write fails; the
    /// stored flag then stays set and the next startup records the run as
    /// interrupted.
    pub fn mark_complete(&self, job_id: &str, run: RunRecord) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound {
                id: job_id.to_string(),
            })?;
        job.in_progress = false;
        job.last_run_status = Some(run.status);
        job.updated_at = run.finished_at;
        let snapshot = job.clone();
        drop(jobs);

        self.store.record_run(&snapshot, &run).inspect_err(|e| {
            let results = serde_json::to_string(&run.results).unwrap_or_default();
            error!(
                job_id,
                run_id = %run.id,
                status = %run.status,
                artifact_title = ?run.artifact_title,
                %results,
                "run record lost: {e}"
            );
        })
    }

    /// Trigger every due job on its own task. Returns the cycle handles.
    pub fn trigger_due(
        self: &Arc<Self>,
        now: DateTime<Utc>,
        executor: &Arc<dyn CycleExecutor>,
        budget: Duration,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for job in self.due_jobs(now) {
            match self.mark_running(&job.id, now) {
                Ok(cycle) => {
                    let this = Arc::clone(self);
                    let executor = Arc::clone(executor);
                    handles.push(tokio::spawn(async move {
                        this.run_cycle(cycle, executor, budget).await;
                    }));
                }
                Err(SchedulerError::AlreadyRunning { .. }) => {
                    debug!(job_id = %job.id, "already running; skipped");
                }
                Err(e) => error!(job_id = %job.id, "failed to start cycle: {e}"),
            }
        }
        handles
    }

    /// Drive one claimed cycle to a RunRecord, whatever happens to the executor.
    pub async fn run_cycle(
        self: Arc<Self>,
        cycle: Cycle,
        executor: Arc<dyn CycleExecutor>,
        budget: Duration,
    ) {
        let job_id = cycle.job.id.clone();
        let run_id = cycle.run_id.clone();
        let started_at = cycle.started_at;
        let target_ids = cycle.job.target_ids.clone();
        let progress = CycleProgress::new();

        let worker = tokio::spawn({
            let progress = progress.clone();
            async move { executor.execute(cycle, progress).await }
        });
        let abort = worker.abort_handle();

        let (status, artifact_title, failure, results) =
            match tokio::time::timeout(budget, worker).await {
                Ok(Ok(CycleOutcome::Published {
                    artifact_title,
                    results,
                })) => (
                    RunStatus::from_results(&results),
                    Some(artifact_title),
                    None,
                    results,
                ),
                Ok(Ok(CycleOutcome::GenerationFailed { message })) => {
                    warn!(job_id = %job_id, "generation failed: {message}");
                    let results = close_out(
                        &self.events,
                        &job_id,
                        &target_ids,
                        Vec::new(),
                        ErrorKind::GenerationFailure,
                        &message,
                    );
                    (RunStatus::Failed, None, Some(message), results)
                }
                Ok(Err(join_err)) => {
                    let message = format!("cycle task failed: {join_err}");
                    error!(job_id = %job_id, "{message}");
                    let results = close_out(
                        &self.events,
                        &job_id,
                        &target_ids,
                        progress.snapshot(),
                        ErrorKind::TransientNetwork,
                        &message,
                    );
                    (RunStatus::Failed, None, Some(message), results)
                }
                Err(_) => {
                    abort.abort();
                    let message = format!("cycle budget of {}s exceeded", budget.as_secs());
                    warn!(job_id = %job_id, "{message}; abandoning");
                    let results = close_out(
                        &self.events,
                        &job_id,
                        &target_ids,
                        progress.snapshot(),
                        ErrorKind::BudgetExceeded,
                        &message,
                    );
                    (RunStatus::Abandoned, None, Some(message), results)
                }
            };

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;
        let run = RunRecord {
            id: run_id,
            job_id: job_id.clone(),
            started_at,
            finished_at: Utc::now(),
            status,
            artifact_title: artifact_title.clone(),
            error: failure.clone(),
            results,
        };

        // a failed write is logged with the lost run by mark_complete
        let _ = self.mark_complete(&job_id, run);

        let (kind, detail) = match failure {
            None => (
                EventKind::JobCompleted,
                serde_json::json!({
                    "title": artifact_title,
                    "succeeded": succeeded,
                    "failed": failed,
                }),
            ),
            Some(error) => (
                EventKind::JobFailed,
                serde_json::json!({
                    "error": error,
                    "succeeded": succeeded,
                    "failed": failed,
                }),
            ),
        };
        info!(job_id = %job_id, %status, succeeded, failed, "cycle finished");
        self.events
            .emit(StatusEvent::new(kind, job_id, status).with_detail(detail));
    }

    /// Main loop. Polls every `tick` until `shutdown` broadcasts `true`.
    /// Cycles already in flight are left to finish on their own tasks.
    pub async fn run(
        self: Arc<Self>,
        executor: Arc<dyn CycleExecutor>,
        tick: Duration,
        budget: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(tick_secs = tick.as_secs(), budget_secs = budget.as_secs(), "scheduler started");

        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let started = self.trigger_due(Utc::now(), &executor, budget);
                    if !started.is_empty() {
                        debug!(count = started.len(), "cycles started");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn set_status(&self, job_id: &str, status: JobStatus) -> Result<Job> {
        let mut jobs = self.jobs.lock().unwrap();
        let current = jobs
            .get(job_id)
            .ok_or_else(|| SchedulerError::JobNotFound {
                id: job_id.to_string(),
            })?;
        let mut next = current.clone();
        next.status = status;
        next.updated_at = Utc::now();
        self.store.save(&next)?;
        jobs.insert(next.id.clone(), next.clone());
        info!(job_id, %status, "job status changed");
        Ok(next)
    }
}

/// Record exactly one interrupted run for a job found in flight at startup.
fn recover_interrupted(
    store: &dyn JobStore,
    events: &EventSink,
    job: &mut Job,
    now: DateTime<Utc>,
) -> Result<()> {
    let results = close_out(
        events,
        &job.id,
        &job.target_ids,
        Vec::new(),
        ErrorKind::TransientNetwork,
        INTERRUPTED,
    );
    let run = RunRecord {
        id: Uuid::new_v4().to_string(),
        job_id: job.id.clone(),
        started_at: job.last_run_at.unwrap_or(now),
        finished_at: now,
        status: RunStatus::Interrupted,
        artifact_title: None,
        error: Some(INTERRUPTED.to_string()),
        results,
    };
    job.in_progress = false;
    job.last_run_status = Some(RunStatus::Interrupted);
    job.updated_at = now;
    store.record_run(job, &run)?;

    warn!(job_id = %job.id, next_run_at = ?job.next_run_at, "recovered job interrupted by restart");
    events.emit(
        StatusEvent::new(EventKind::JobRecovered, job.id.clone(), RunStatus::Interrupted)
            .with_detail(serde_json::json!({ "next_run_at": job.next_run_at })),
    );
    Ok(())
}

/// One result per target in `target_ids` order: finished results are kept,
/// the rest become permanent failures of `kind`. Each filled-in failure is
/// emitted as a terminal `publish_attempt` event.
fn close_out(
    events: &EventSink,
    job_id: &str,
    target_ids: &[String],
    finished: Vec<PublishResult>,
    kind: ErrorKind,
    message: &str,
) -> Vec<PublishResult> {
    let mut by_target: HashMap<String, PublishResult> = finished
        .into_iter()
        .map(|r| (r.target_id.clone(), r))
        .collect();
    target_ids
        .iter()
        .map(|id| {
            by_target.remove(id).unwrap_or_else(|| {
                let result = PublishResult::failed(id.clone(), 0, kind, message);
                events.emit(
                    StatusEvent::new(EventKind::PublishAttempt, job_id, result.state)
                        .with_target(id.clone())
                        .with_detail(serde_json::json!({
                            "attempt": 0,
                            "error_kind": kind.to_string(),
                            "message": message,
                        })),
                );
                result
            })
        })
        .collect()
}
