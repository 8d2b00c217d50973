use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Defines when and how often a job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire exactly once at the given UTC instant.
    Once { at: DateTime<Utc> },

    /// Repeat with a fixed interval in seconds.
    Interval { every_secs: u64 },

    /// Fire every day at HH:MM UTC.
    Daily { hour: u8, minute: u8 },

    /// Fire on a weekday (0 = Monday … 6 = Sunday) at HH:MM UTC.
    Weekly { day: u8, hour: u8, minute: u8 },

    /// Cron expression, 5 fields or 6 with leading seconds, evaluated in UTC.
    Cron { expression: String },
}

/// Writing style requested from the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritingStyle {
    #[default]
    Informative,
    Casual,
    Technical,
    HowTo,
}

impl WritingStyle {
    /// Tone and outline handed to the model for this style.
    pub fn template(&self) -> (&'static str, &'static str) {
        match self {
            WritingStyle::Informative => (
                "professional and educational",
                "introduction, main points, conclusion",
            ),
            WritingStyle::Casual => (
                "conversational and friendly",
                "hook, story, insights, call to action",
            ),
            WritingStyle::Technical => (
                "detailed and precise",
                "overview, technical details, implementation, conclusion",
            ),
            WritingStyle::HowTo => (
                "instructional and clear",
                "introduction, step by step guide, troubleshooting, tips",
            ),
        }
    }
}

/// Knobs forwarded to the Artifact Generator and, for `category` and
/// `publish_status`, to the platform adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default = "default_max_words")]
    pub max_words: u32,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default)]
    pub style: WritingStyle,
    #[serde(default)]
    pub category: Option<String>,
    /// Platform-side status for the created post ("draft", "published", …).
    #[serde(default = "default_publish_status")]
    pub publish_status: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            audience: default_audience(),
            style: WritingStyle::default(),
            category: None,
            publish_status: default_publish_status(),
        }
    }
}

fn default_max_words() -> u32 {
    800
}
fn default_audience() -> String {
    "general".to_string()
}
fn default_publish_status() -> String {
    "draft".to_string()
}

/// One generated piece of content. Immutable once built; publish attempts
/// share it through an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub job_id: String,
    pub topic: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    /// Platform category, when the job sets one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Platform-side status requested for the created post.
    #[serde(default = "default_publish_status")]
    pub publish_status: String,
    pub generated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        job_id: impl Into<String>,
        topic: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            topic: topic.into(),
            title: title.into(),
            body: body.into(),
            tags,
            category: None,
            publish_status: default_publish_status(),
            generated_at: Utc::now(),
        }
    }

    /// Carry the job's category and post status onto the artifact.
    pub fn with_post_options(mut self, params: &GenerationParams) -> Self {
        self.category = params.category.clone();
        self.publish_status = params.publish_status.clone();
        self
    }

    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

/// How an adapter authenticates against a target. Exactly one strategy per
/// target; the header name is only configurable where the platform allows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum AuthScheme {
    /// Static key in a custom header (default `X-API-Key`).
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header: String,
    },
    /// `Authorization: Bearer <token>`.
    BearerJwt,
    /// Opaque session blob injected into a custom header (default `x-admin-session`).
    SessionBlob {
        #[serde(default = "default_session_header")]
        header: String,
    },
}

impl AuthScheme {
    pub fn name(&self) -> &'static str {
        match self {
            AuthScheme::ApiKey { .. } => "api_key",
            AuthScheme::BearerJwt => "bearer_jwt",
            AuthScheme::SessionBlob { .. } => "session_blob",
        }
    }
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}
fn default_session_header() -> String {
    "x-admin-session".to_string()
}

/// A configured publishing destination. Read-only to the core.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub id: String,
    /// Adapter key in the registry (`rest`, `medium`, `nextjs`, …).
    pub platform_kind: String,
    pub endpoint: String,
    pub auth: AuthScheme,
    pub credential: String,
}

impl std::fmt::Debug for PublishTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishTarget")
            .field("id", &self.id)
            .field("platform_kind", &self.platform_kind)
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Shared failure taxonomy for generation and publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Payload defect. Permanent.
    Validation,
    /// Credential defect. Permanent; operators should rotate the secret.
    Auth,
    /// Platform asked us to slow down. Retryable.
    RateLimited,
    /// 5xx, timeouts, refused connections. Retryable.
    TransientNetwork,
    /// The generator failed; nothing was published.
    GenerationFailure,
    /// The cycle ran past its wall-clock budget.
    BudgetExceeded,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::TransientNetwork)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::GenerationFailure => "generation_failure",
            ErrorKind::BudgetExceeded => "budget_exceeded",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle of one publish attempt against one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    InFlight,
    Success,
    RetryableFailure,
    PermanentFailure,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Success | AttemptState::PermanentFailure)
    }

    /// Whether `self -> next` is an edge of the attempt state machine.
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Pending, InFlight)
                | (Pending, PermanentFailure)
                | (InFlight, Success)
                | (InFlight, RetryableFailure)
                | (InFlight, PermanentFailure)
                | (RetryableFailure, Pending)
                | (RetryableFailure, PermanentFailure)
        )
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptState::Pending => "pending",
            AttemptState::InFlight => "in_flight",
            AttemptState::Success => "success",
            AttemptState::RetryableFailure => "retryable_failure",
            AttemptState::PermanentFailure => "permanent_failure",
        };
        write!(f, "{s}")
    }
}

/// Terminal outcome for one target of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub target_id: String,
    /// Always `Success` or `PermanentFailure`.
    pub state: AttemptState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl PublishResult {
    pub fn is_success(&self) -> bool {
        self.state == AttemptState::Success
    }

    /// A permanent failure that never reached the platform (or was cut off).
    pub fn failed(
        target_id: impl Into<String>,
        attempts: u32,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            state: AttemptState::PermanentFailure,
            attempts,
            platform_id: None,
            published_url: None,
            error_kind: Some(kind),
            http_status: None,
            message: Some(message.into()),
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        use AttemptState::*;
        for from in [Success, PermanentFailure] {
            for to in [Pending, InFlight, Success, RetryableFailure, PermanentFailure] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn retry_loop_edges_are_allowed() {
        use AttemptState::*;
        assert!(Pending.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(RetryableFailure));
        assert!(RetryableFailure.can_transition_to(Pending));
        assert!(!RetryableFailure.can_transition_to(InFlight));
        assert!(!Pending.can_transition_to(Success));
    }

    #[test]
    fn only_rate_limit_and_network_errors_retry() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::TransientNetwork.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::BudgetExceeded.is_retryable());
    }

    #[test]
    fn target_debug_redacts_credential() {
        let target = PublishTarget {
            id: "blog".into(),
            platform_kind: "rest".into(),
            endpoint: "https://example.com".into(),
            auth: AuthScheme::BearerJwt,
            credential: "super-secret".into(),
        };
        let dbg = format!("{target:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn auth_scheme_header_defaults() {
        let scheme: AuthScheme = serde_json::from_str(r#"{"scheme":"api_key"}"#).unwrap();
        assert_eq!(
            scheme,
            AuthScheme::ApiKey {
                header: "X-API-Key".into()
            }
        );
        let scheme: AuthScheme = serde_json::from_str(r#"{"scheme":"session_blob"}"#).unwrap();
        assert_eq!(
            scheme,
            AuthScheme::SessionBlob {
                header: "x-admin-session".into()
            }
        );
    }
}
