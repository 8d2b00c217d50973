use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pressroom_core::{CycleProgress, EventKind, EventSink, StatusEvent};
use pressroom_generator::{generate_with_timeout, ArtifactGenerator};
use pressroom_publish::PublishOrchestrator;
use pressroom_scheduler::{Cycle, CycleExecutor, CycleOutcome};
use tracing::{info, warn};

/// Generate one artifact for the cycle's topic, then publish it to every
/// target of the job.
pub struct PublishCycle {
    generator: Arc<dyn ArtifactGenerator>,
    orchestrator: PublishOrchestrator,
    generation_timeout: Duration,
    events: EventSink,
}

impl PublishCycle {
    pub fn new(
        generator: Arc<dyn ArtifactGenerator>,
        orchestrator: PublishOrchestrator,
        generation_timeout: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            generator,
            orchestrator,
            generation_timeout,
            events,
        }
    }
}

#[async_trait]
impl CycleExecutor for PublishCycle {
    async fn execute(&self, cycle: Cycle, progress: CycleProgress) -> CycleOutcome {
        let job = &cycle.job;
        for target_id in &job.target_ids {
            if !self.orchestrator.has_target(target_id) {
                warn!(job_id = %job.id, target_id, "job references an unconfigured target");
            }
        }

        let artifact = match generate_with_timeout(
            self.generator.as_ref(),
            self.generation_timeout,
            &job.id,
            &cycle.topic,
            &job.params,
        )
        .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                return CycleOutcome::GenerationFailed {
                    message: e.to_string(),
                }
            }
        };

        info!(job_id = %job.id, run_id = %cycle.run_id, title = %artifact.title, "artifact generated");
        self.events.emit(
            StatusEvent::new(EventKind::ArtifactGenerated, &job.id, "generated").with_detail(
                serde_json::json!({
                    "run_id": cycle.run_id,
                    "artifact_id": artifact.id,
                    "topic": artifact.topic,
                    "title": artifact.title,
                    "words": artifact.word_count(),
                    "tags": artifact.tags,
                }),
            ),
        );

        let artifact_title = artifact.title.clone();
        let results = self
            .orchestrator
            .publish(Arc::new(artifact), &job.target_ids, &progress)
            .await;
        CycleOutcome::Published {
            artifact_title,
            results,
        }
    }
}
