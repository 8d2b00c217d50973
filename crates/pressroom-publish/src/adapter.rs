use async_trait::async_trait;
use pressroom_core::{Artifact, PublishTarget};
use serde::{Deserialize, Serialize};

use crate::error::PublishError;

/// What a platform hands back for a created post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub platform_id: String,
    pub published_url: Option<String>,
}

/// Common interface implemented by every platform adapter (REST site, Medium, Next.js admin, …).
///
/// An adapter translates an [`Artifact`] into the platform's payload, builds
/// auth headers from the target's scheme, performs exactly one submission
/// and maps the response into the shared taxonomy. Retrying is the
/// orchestrator's job, never the adapter's.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable lowercase key matched against `PublishTarget::platform_kind`.
    fn kind(&self) -> &str;

    async fn submit(
        &self,
        artifact: &Artifact,
        target: &PublishTarget,
    ) -> Result<Receipt, PublishError>;
}
