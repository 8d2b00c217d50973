//! `pressroom-generator`: turns a topic into an [`Artifact`].
//!
//! The scheduler only sees the [`ArtifactGenerator`] trait and always calls
//! it through [`generate_with_timeout`]. [`OpenAiGenerator`] talks to any
//! OpenAI-compatible `/v1/chat/completions` endpoint.

pub mod content;
pub mod error;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use pressroom_core::{Artifact, GenerationParams};
use tracing::warn;

pub use error::{GenerationError, Result};
pub use openai::OpenAiGenerator;

#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        job_id: &str,
        topic: &str,
        params: &GenerationParams,
    ) -> Result<Artifact>;
}

/// Run `generator` under a hard deadline.
pub async fn generate_with_timeout(
    generator: &dyn ArtifactGenerator,
    timeout: Duration,
    job_id: &str,
    topic: &str,
    params: &GenerationParams,
) -> Result<Artifact> {
    if topic.trim().is_empty() {
        return Err(GenerationError::EmptyTopic);
    }
    match tokio::time::timeout(timeout, generator.generate(job_id, topic, params)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(job_id, generator = generator.name(), "generation timed out");
            Err(GenerationError::Timeout {
                secs: timeout.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy;

    #[async_trait]
    impl ArtifactGenerator for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }
        async fn generate(
            &self,
            job_id: &str,
            topic: &str,
            _params: &GenerationParams,
        ) -> Result<Artifact> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(Artifact::new(job_id, topic, "late", "late", vec![]))
        }
    }

    struct Quick;

    #[async_trait]
    impl ArtifactGenerator for Quick {
        fn name(&self) -> &str {
            "quick"
        }
        async fn generate(
            &self,
            job_id: &str,
            topic: &str,
            params: &GenerationParams,
        ) -> Result<Artifact> {
            Ok(Artifact::new(job_id, topic, "Title", "Body", vec![]).with_post_options(params))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generator_times_out() {
        let err = generate_with_timeout(
            &Sleepy,
            Duration::from_secs(60),
            "job",
            "rust",
            &GenerationParams::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { secs: 60 }));
    }

    #[tokio::test]
    async fn blank_topic_is_rejected_before_calling_out() {
        let err = generate_with_timeout(
            &Quick,
            Duration::from_secs(60),
            "job",
            "   ",
            &GenerationParams::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyTopic));
    }

    #[tokio::test]
    async fn fast_generator_passes_through() {
        let artifact = generate_with_timeout(
            &Quick,
            Duration::from_secs(60),
            "job",
            "rust",
            &GenerationParams::default(),
        )
        .await
        .unwrap();
        assert_eq!(artifact.job_id, "job");
        assert_eq!(artifact.publish_status, "draft");
    }
}
