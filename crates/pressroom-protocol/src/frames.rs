use chrono::{DateTime, Utc};
use pressroom_core::{EventKind, StatusEvent};
use serde::{Deserialize, Serialize};

/// Client → Server frames. Observers never mutate server state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Wire: `{ "type": "connect", "token": "…", "kinds": ["job_failed"] }`
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        /// Empty means every kind.
        #[serde(default)]
        kinds: Vec<EventKind>,
    },
    /// Replace the subscription set. Empty means every kind.
    Subscribe { kinds: Vec<EventKind> },
    Ping,
    Pong,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Server → Client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Full status, sent once right after a successful `connect`.
    Snapshot {
        server: ServerInfo,
        jobs: Vec<JobSummary>,
    },
    /// Wire: `{ "type": "event", "seq": 42, "event": { "kind": …, "job_id": … } }`
    Event { seq: u64, event: StatusEvent },
    Ping,
    Pong,
    Error { code: String, message: String },
}

impl ServerFrame {
    pub fn event(seq: u64, event: StatusEvent) -> Self {
        ServerFrame::Event { seq, event }
    }

    pub fn error(code: &str, message: &str) -> Self {
        ServerFrame::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Serialize to a text payload. Frames only hold strings, numbers and
    /// JSON values, so this cannot fail in practice.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol: u32,
}

/// Per-job line in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    /// `active` or `paused`.
    pub status: String,
    pub in_progress: bool,
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<String>,
}
