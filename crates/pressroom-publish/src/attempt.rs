use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pressroom_core::{Artifact, AttemptState, ErrorKind, EventKind, PublishResult, StatusEvent};
use thiserror::Error;

use crate::adapter::Receipt;
use crate::error::PublishError;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid attempt transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: AttemptState,
    pub to: AttemptState,
}

/// Per-target state machine for one artifact.
///
/// ```text
/// pending ─▶ in_flight ─┬─▶ success
///    ▲                  ├─▶ retryable_failure ─┬─▶ pending (after backoff)
///    │                  │                      └─▶ permanent_failure
///    └──────────────────┴─▶ permanent_failure
/// ```
#[derive(Debug, Clone)]
pub struct PublishAttempt {
    pub target_id: String,
    pub artifact: Arc<Artifact>,
    /// 1-based; bumped when a retry re-enters `pending`.
    pub attempt_number: u32,
    pub state: AttemptState,
    pub http_status: Option<u16>,
    pub error_kind: Option<ErrorKind>,
    pub retry_after_hint: Option<Duration>,
    pub message: Option<String>,
    pub receipt: Option<Receipt>,
    pub timestamp: DateTime<Utc>,
}

impl PublishAttempt {
    pub fn new(target_id: impl Into<String>, artifact: Arc<Artifact>) -> Self {
        Self {
            target_id: target_id.into(),
            artifact,
            attempt_number: 1,
            state: AttemptState::Pending,
            http_status: None,
            error_kind: None,
            retry_after_hint: None,
            message: None,
            receipt: None,
            timestamp: Utc::now(),
        }
    }

    /// Move to `next`. Terminal states are immutable.
    pub fn transition(&mut self, next: AttemptState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if self.state == AttemptState::RetryableFailure && next == AttemptState::Pending {
            self.attempt_number += 1;
            self.http_status = None;
            self.retry_after_hint = None;
        }
        self.state = next;
        self.timestamp = Utc::now();
        Ok(())
    }

    pub fn succeed(&mut self, receipt: Receipt) -> Result<(), InvalidTransition> {
        self.transition(AttemptState::Success)?;
        self.error_kind = None;
        self.message = None;
        self.receipt = Some(receipt);
        Ok(())
    }

    /// Record `err` and move to `next` (retryable or permanent failure).
    pub fn fail(&mut self, next: AttemptState, err: &PublishError) -> Result<(), InvalidTransition> {
        self.transition(next)?;
        self.error_kind = Some(err.kind);
        self.http_status = err.http_status;
        self.retry_after_hint = err.retry_after;
        self.message = Some(err.message.clone());
        Ok(())
    }

    /// `publish_attempt` status event for the current state.
    pub fn to_event(&self) -> StatusEvent {
        let mut detail = serde_json::json!({ "attempt": self.attempt_number });
        if let Some(status) = self.http_status {
            detail["http_status"] = status.into();
        }
        if let Some(kind) = self.error_kind {
            detail["error_kind"] = kind.to_string().into();
        }
        if let Some(hint) = self.retry_after_hint {
            detail["retry_after_secs"] = hint.as_secs().into();
        }
        if let Some(ref message) = self.message {
            detail["message"] = message.clone().into();
        }
        if let Some(ref receipt) = self.receipt {
            detail["platform_id"] = receipt.platform_id.clone().into();
            if let Some(ref url) = receipt.published_url {
                detail["url"] = url.clone().into();
            }
        }
        StatusEvent::new(EventKind::PublishAttempt, self.artifact.job_id.clone(), self.state)
            .with_target(self.target_id.clone())
            .with_detail(detail)
    }

    /// Terminal outcome for the target. Only meaningful once terminal.
    pub fn to_result(&self) -> PublishResult {
        PublishResult {
            target_id: self.target_id.clone(),
            state: self.state,
            attempts: self.attempt_number,
            platform_id: self.receipt.as_ref().map(|r| r.platform_id.clone()),
            published_url: self.receipt.as_ref().and_then(|r| r.published_url.clone()),
            error_kind: self.error_kind,
            http_status: self.http_status,
            message: self.message.clone(),
            finished_at: self.timestamp,
        }
    }
}
