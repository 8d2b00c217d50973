use chrono::{DateTime, Utc};
use pressroom_core::{GenerationParams, PublishResult, Schedule};
use serde::{Deserialize, Serialize};

/// Whether the scheduler may trigger a job. Jobs are never deleted, only paused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Active,
    Paused,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Active => "active",
            JobStatus::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(JobStatus::Active),
            "paused" => Ok(JobStatus::Paused),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Summary outcome of one job-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every target succeeded.
    Succeeded,
    /// At least one target succeeded and at least one failed.
    Partial,
    /// Generation failed, or every target failed.
    Failed,
    /// The cycle ran past its budget and was dropped.
    Abandoned,
    /// The process stopped while the cycle was in flight.
    Interrupted,
}

impl RunStatus {
    pub fn from_results(results: &[PublishResult]) -> Self {
        let ok = results.iter().filter(|r| r.is_success()).count();
        if results.is_empty() || ok == 0 {
            RunStatus::Failed
        } else if ok == results.len() {
            RunStatus::Succeeded
        } else {
            RunStatus::Partial
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Abandoned => "abandoned",
            RunStatus::Interrupted => "interrupted",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(RunStatus::Succeeded),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            "abandoned" => Ok(RunStatus::Abandoned),
            "interrupted" => Ok(RunStatus::Interrupted),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Topic set; one topic is used per cycle, rotating.
    pub topics: Vec<String>,
    pub schedule: Schedule,
    pub target_ids: Vec<String>,
    pub params: GenerationParams,
    pub status: JobStatus,
    /// Set (and persisted) before a cycle starts, cleared when it ends.
    pub in_progress: bool,
    /// `None` once a one-shot schedule has fired.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    /// Index into `topics` for the next cycle.
    pub topic_cursor: u32,
    /// Number of cycles triggered so far.
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        topics: Vec<String>,
        schedule: Schedule,
        target_ids: Vec<String>,
        params: GenerationParams,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            topics,
            schedule,
            target_ids,
            params,
            status: JobStatus::Active,
            in_progress: false,
            next_run_at: None,
            last_run_at: None,
            last_run_status: None,
            topic_cursor: 0,
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Due: `now >= next_run_at`, not in flight, not paused.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Active
            && !self.in_progress
            && self.next_run_at.is_some_and(|next| next <= now)
    }

    /// Topic the next cycle will write about.
    pub fn next_topic(&self) -> Option<&str> {
        if self.topics.is_empty() {
            return None;
        }
        let idx = self.topic_cursor as usize % self.topics.len();
        Some(self.topics[idx].as_str())
    }
}

/// One triggered job-cycle, handed to the executor after `in_progress` is persisted.
#[derive(Debug, Clone)]
pub struct Cycle {
    pub run_id: String,
    /// Snapshot of the job as persisted by `mark_running`.
    pub job: Job,
    pub topic: String,
    pub started_at: DateTime<Utc>,
}

/// Append-only run history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub artifact_title: Option<String>,
    pub error: Option<String>,
    /// One entry per target, in the job's target order.
    pub results: Vec<PublishResult>,
}
