use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Category of a status event. Observers subscribe by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The scheduler set `in_progress` and handed the job to a worker.
    JobTriggered,
    /// The generator returned an artifact.
    ArtifactGenerated,
    /// A publish attempt changed state.
    PublishAttempt,
    /// Every target reached a terminal state.
    JobCompleted,
    /// Generation failed or the cycle was abandoned.
    JobFailed,
    /// A run interrupted by a restart was closed out on startup.
    JobRecovered,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::JobTriggered => "job_triggered",
            EventKind::ArtifactGenerated => "artifact_generated",
            EventKind::PublishAttempt => "publish_attempt",
            EventKind::JobCompleted => "job_completed",
            EventKind::JobFailed => "job_failed",
            EventKind::JobRecovered => "job_recovered",
        };
        write!(f, "{s}")
    }
}

/// Wire shape: `{ kind, job_id, target_id?, state, timestamp, detail? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub kind: EventKind,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub state: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl StatusEvent {
    pub fn new(kind: EventKind, job_id: impl Into<String>, state: impl ToString) -> Self {
        Self {
            kind,
            job_id: job_id.into(),
            target_id: None,
            state: state.to_string(),
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Producer side of the status feed. Unbounded so emitting never blocks a
/// scheduler or publish task; the broadcast manager applies backpressure
/// per observer.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything (tests, tools).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: StatusEvent) {
        if let Some(ref tx) = self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("status event dropped: feed closed");
            }
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::disabled()
    }
}
