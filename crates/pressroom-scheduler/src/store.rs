use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::types::{Job, RunRecord};

/// Durable home of jobs and their run history. The scheduler keeps a
/// write-through copy in memory; the store is the source of truth on restart.
pub trait JobStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Job>>;

    /// Upsert; last write wins.
    fn save(&self, job: &Job) -> Result<()>;

    /// Append `run` to the job's history and persist the job's post-run
    /// state in one step.
    fn record_run(&self, job: &Job, run: &RunRecord) -> Result<()>;

    /// Most recent runs first.
    fn runs(&self, job_id: &str, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Non-durable store for tests and dry runs.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
    runs: Mutex<Vec<RunRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn load_all(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.created_at);
        Ok(all)
    }

    fn save(&self, job: &Job) -> Result<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn record_run(&self, job: &Job, run: &RunRecord) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        self.runs.lock().unwrap().push(run.clone());
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn runs(&self, job_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs
            .iter()
            .rev()
            .filter(|r| r.job_id == job_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
