use std::time::Duration;

use pressroom_core::ErrorKind;
use thiserror::Error;

/// Failure of one `submit` call, already mapped into the shared taxonomy.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct PublishError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    /// Server-provided Retry-After, when numeric.
    pub retry_after: Option<Duration>,
    pub message: String,
}

impl PublishError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Map a non-2xx response.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", truncate(body, 300))
        };
        Self {
            kind: classify_status(status),
            http_status: Some(status),
            retry_after,
            message,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::TransientNetwork,
            format!("submit timed out after {}s", after.as_secs()),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        // A body we cannot decode means the platform answered with a shape we
        // do not understand; anything else failed on the way there.
        let kind = if e.is_decode() || e.is_builder() {
            ErrorKind::Validation
        } else {
            ErrorKind::TransientNetwork
        };
        Self {
            kind,
            http_status: e.status().map(|s| s.as_u16()),
            retry_after: None,
            message: e.to_string(),
        }
    }
}

/// HTTP status → error kind.
///
/// | status            | kind                |
/// |-------------------|---------------------|
/// | 401, 403          | `auth`              |
/// | 429               | `rate_limited`      |
/// | 408, 5xx          | `transient_network` |
/// | any other non-2xx | `validation`        |
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        429 => ErrorKind::RateLimited,
        408 | 500..=599 => ErrorKind::TransientNetwork,
        _ => ErrorKind::Validation,
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
