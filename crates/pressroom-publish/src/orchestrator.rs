use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use pressroom_core::{
    config::PublishConfig, Artifact, AttemptState, CycleProgress, ErrorKind, EventSink,
    PublishResult, PublishTarget,
};
use tracing::{error, info, warn};

use crate::attempt::PublishAttempt;
use crate::error::PublishError;
use crate::registry::AdapterRegistry;
use crate::retry::RetryPolicy;

/// Fans one artifact out to many targets, each driven through its own
/// retry state machine. Targets run concurrently; one target's failure
/// never affects another's.
pub struct PublishOrchestrator {
    registry: AdapterRegistry,
    targets: HashMap<String, PublishTarget>,
    policy: RetryPolicy,
    submit_timeout: Duration,
    events: EventSink,
}

impl PublishOrchestrator {
    pub fn new(
        registry: AdapterRegistry,
        targets: impl IntoIterator<Item = PublishTarget>,
        config: &PublishConfig,
        events: EventSink,
    ) -> Self {
        Self {
            registry,
            targets: targets.into_iter().map(|t| (t.id.clone(), t)).collect(),
            policy: RetryPolicy::from(config),
            submit_timeout: Duration::from_secs(config.submit_timeout_secs),
            events,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn has_target(&self, target_id: &str) -> bool {
        self.targets.contains_key(target_id)
    }

    /// Publish `artifact` to every target in `target_ids`.
    ///
    /// Returns one result per target, in input order, once every target is
    /// terminal. Each terminal result is also pushed into `progress`.
    pub async fn publish(
        &self,
        artifact: Arc<Artifact>,
        target_ids: &[String],
        progress: &CycleProgress,
    ) -> Vec<PublishResult> {
        info!(job_id = %artifact.job_id, targets = target_ids.len(), title = %artifact.title, "publishing artifact");
        let results = join_all(
            target_ids
                .iter()
                .map(|id| self.publish_target(Arc::clone(&artifact), id, progress)),
        )
        .await;

        let ok = results.iter().filter(|r| r.is_success()).count();
        info!(job_id = %artifact.job_id, succeeded = ok, failed = results.len() - ok, "publish finished");
        results
    }

    async fn publish_target(
        &self,
        artifact: Arc<Artifact>,
        target_id: &str,
        progress: &CycleProgress,
    ) -> PublishResult {
        let mut attempt = PublishAttempt::new(target_id, Arc::clone(&artifact));

        let Some(target) = self.targets.get(target_id) else {
            let err = PublishError::new(
                ErrorKind::Validation,
                format!("unknown target '{target_id}'"),
            );
            return self.reject(attempt, &err, progress);
        };
        let Some(adapter) = self.registry.adapter_for(target) else {
            let err = PublishError::new(
                ErrorKind::Validation,
                format!("no adapter registered for platform '{}'", target.platform_kind),
            );
            return self.reject(attempt, &err, progress);
        };

        loop {
            self.step(&mut attempt, |a| a.transition(AttemptState::InFlight));

            let outcome =
                match tokio::time::timeout(self.submit_timeout, adapter.submit(&artifact, target))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(PublishError::timeout(self.submit_timeout)),
                };

            let err = match outcome {
                Ok(receipt) => {
                    info!(
                        target_id,
                        attempt = attempt.attempt_number,
                        platform_id = %receipt.platform_id,
                        "published"
                    );
                    self.step(&mut attempt, |a| a.succeed(receipt));
                    return self.finish(&attempt, progress);
                }
                Err(err) => err,
            };

            let delay = if err.is_retryable() && self.policy.has_attempts_left(attempt.attempt_number)
            {
                self.policy.delay_after(attempt.attempt_number, err.retry_after)
            } else {
                None
            };

            let Some(delay) = delay else {
                warn!(
                    target_id,
                    attempt = attempt.attempt_number,
                    kind = %err.kind,
                    http_status = ?err.http_status,
                    "publish failed permanently: {}",
                    err.message
                );
                self.step(&mut attempt, |a| a.fail(AttemptState::PermanentFailure, &err));
                return self.finish(&attempt, progress);
            };

            warn!(
                target_id,
                attempt = attempt.attempt_number,
                kind = %err.kind,
                retry_in_ms = delay.as_millis() as u64,
                "publish failed, retrying with backoff"
            );
            self.step(&mut attempt, |a| a.fail(AttemptState::RetryableFailure, &err));
            tokio::time::sleep(delay).await;
            self.step(&mut attempt, |a| a.transition(AttemptState::Pending));
        }
    }

    /// Apply one transition and emit it. An invalid transition is a bug in
    /// this loop, not a platform problem, so it is logged and skipped.
    fn step<F>(&self, attempt: &mut PublishAttempt, f: F)
    where
        F: FnOnce(&mut PublishAttempt) -> Result<(), crate::attempt::InvalidTransition>,
    {
        match f(attempt) {
            Ok(()) => self.events.emit(attempt.to_event()),
            Err(e) => error!(target_id = %attempt.target_id, "{e}"),
        }
    }

    fn finish(&self, attempt: &PublishAttempt, progress: &CycleProgress) -> PublishResult {
        let result = attempt.to_result();
        progress.record(result.clone());
        result
    }

    /// Fail a target that can never be attempted. No network call is made.
    fn reject(
        &self,
        mut attempt: PublishAttempt,
        err: &PublishError,
        progress: &CycleProgress,
    ) -> PublishResult {
        warn!(target_id = %attempt.target_id, "{}", err.message);
        self.step(&mut attempt, |a| a.fail(AttemptState::PermanentFailure, err));
        let mut result = attempt.to_result();
        result.attempts = 0;
        progress.record(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, Receipt};
    use async_trait::async_trait;
    use pressroom_core::{AuthScheme, EventKind};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    type Reply = Result<Receipt, PublishError>;

    /// Replays a per-target script; the last reply repeats once exhausted.
    /// A target with no script hangs forever.
    #[derive(Default)]
    struct ScriptedAdapter {
        scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
        last: Mutex<HashMap<String, Reply>>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedAdapter {
        fn script(self, target: &str, replies: Vec<Reply>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(target.to_string(), replies.into());
            self
        }

        fn calls(&self, target: &str) -> u32 {
            self.calls.lock().unwrap().get(target).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Adapter for ScriptedAdapter {
        fn kind(&self) -> &str {
            "scripted"
        }

        async fn submit(&self, _artifact: &Artifact, target: &PublishTarget) -> Reply {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(target.id.clone())
                .or_default() += 1;
            let next = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&target.id)
                .and_then(|q| q.pop_front());
            let reply = match next {
                Some(reply) => {
                    self.last
                        .lock()
                        .unwrap()
                        .insert(target.id.clone(), reply.clone());
                    Some(reply)
                }
                None => self.last.lock().unwrap().get(&target.id).cloned(),
            };
            match reply {
                Some(reply) => reply,
                None => std::future::pending().await,
            }
        }
    }

    fn ok(id: &str) -> Reply {
        Ok(Receipt {
            platform_id: id.to_string(),
            published_url: Some(format!("https://example.com/{id}")),
        })
    }

    fn http(status: u16) -> Reply {
        Err(PublishError::from_status(status, None, ""))
    }

    fn rate_limited(secs: u64) -> Reply {
        Err(PublishError::from_status(
            429,
            Some(Duration::from_secs(secs)),
            "slow down",
        ))
    }

    fn target(id: &str, kind: &str) -> PublishTarget {
        PublishTarget {
            id: id.into(),
            platform_kind: kind.into(),
            endpoint: "https://example.com".into(),
            auth: AuthScheme::BearerJwt,
            credential: "token".into(),
        }
    }

    fn orchestrator(adapter: Arc<ScriptedAdapter>, events: EventSink) -> PublishOrchestrator {
        let mut registry = AdapterRegistry::new();
        registry.register(adapter);
        PublishOrchestrator::new(
            registry,
            vec![
                target("a", "scripted"),
                target("b", "scripted"),
                target("c", "scripted"),
                target("sub", "substack"),
            ],
            &PublishConfig::default(),
            events,
        )
    }

    fn artifact() -> Arc<Artifact> {
        Arc::new(Artifact::new(
            "job-1",
            "rust",
            "Why Rust",
            "Because.",
            vec!["rust".into()],
        ))
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn bad_request_fails_after_one_attempt() {
        let adapter = Arc::new(ScriptedAdapter::default().script("a", vec![http(400), ok("never")]));
        let (events, mut rx) = EventSink::channel();
        let orch = orchestrator(adapter.clone(), events);
        let progress = CycleProgress::new();

        let results = orch.publish(artifact(), &ids(&["a"]), &progress).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, AttemptState::PermanentFailure);
        assert_eq!(results[0].error_kind, Some(ErrorKind::Validation));
        assert_eq!(results[0].attempts, 1);
        assert_eq!(results[0].http_status, Some(400));
        assert_eq!(adapter.calls("a"), 1);
        assert_eq!(progress.snapshot(), results);

        let states: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .inspect(|ev| assert_eq!(ev.kind, EventKind::PublishAttempt))
            .map(|ev| ev.state)
            .collect();
        assert_eq!(states, vec!["in_flight", "permanent_failure"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_is_honoured() {
        let adapter = Arc::new(ScriptedAdapter::default().script("a", vec![rate_limited(5), ok("p1")]));
        let orch = orchestrator(adapter.clone(), EventSink::disabled());

        let started = Instant::now();
        let results = orch
            .publish(artifact(), &ids(&["a"]), &CycleProgress::new())
            .await;

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(results[0].is_success());
        assert_eq!(results[0].attempts, 2);
        assert_eq!(results[0].platform_id.as_deref(), Some("p1"));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_server_errors_exhaust_attempts() {
        let adapter = Arc::new(ScriptedAdapter::default().script("a", vec![http(500)]));
        let (events, mut rx) = EventSink::channel();
        let orch = orchestrator(adapter.clone(), events);

        let started = Instant::now();
        let results = orch
            .publish(artifact(), &ids(&["a"]), &CycleProgress::new())
            .await;

        assert_eq!(results[0].state, AttemptState::PermanentFailure);
        assert_eq!(results[0].error_kind, Some(ErrorKind::TransientNetwork));
        assert_eq!(results[0].attempts, 4);
        assert_eq!(adapter.calls("a"), 4);
        // 2s + 4s + 8s of backoff before attempts 2..4
        assert!(started.elapsed() >= Duration::from_secs(14));

        let retries = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|ev| ev.state == "retryable_failure")
            .count();
        assert_eq!(retries, 3);
    }

    #[tokio::test]
    async fn partial_success_is_reported_per_target() {
        let adapter = Arc::new(
            ScriptedAdapter::default()
                .script("a", vec![ok("a1")])
                .script("b", vec![http(401)])
                .script("c", vec![ok("c1")]),
        );
        let orch = orchestrator(adapter.clone(), EventSink::disabled());

        let results = orch
            .publish(artifact(), &ids(&["a", "b", "c"]), &CycleProgress::new())
            .await;

        let order: Vec<&str> = results.iter().map(|r| r.target_id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);
        assert_eq!(results[1].error_kind, Some(ErrorKind::Auth));
        assert_eq!(adapter.calls("b"), 1);
    }

    #[tokio::test]
    async fn unknown_targets_never_reach_the_network() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let orch = orchestrator(adapter.clone(), EventSink::disabled());

        let results = orch
            .publish(artifact(), &ids(&["ghost", "sub"]), &CycleProgress::new())
            .await;

        for r in &results {
            assert_eq!(r.state, AttemptState::PermanentFailure);
            assert_eq!(r.error_kind, Some(ErrorKind::Validation));
            assert_eq!(r.attempts, 0);
        }
        assert!(results[1].message.as_deref().unwrap().contains("substack"));
        assert_eq!(adapter.calls("ghost") + adapter.calls("sub"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_retry_after_gives_up() {
        let adapter = Arc::new(ScriptedAdapter::default().script("a", vec![rate_limited(3600)]));
        let orch = orchestrator(adapter.clone(), EventSink::disabled());

        let started = Instant::now();
        let results = orch
            .publish(artifact(), &ids(&["a"]), &CycleProgress::new())
            .await;

        assert_eq!(results[0].state, AttemptState::PermanentFailure);
        assert_eq!(results[0].error_kind, Some(ErrorKind::RateLimited));
        assert_eq!(adapter.calls("a"), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_submit_times_out_as_transient() {
        // No script for "a": every submit hangs.
        let adapter = Arc::new(ScriptedAdapter::default());
        let orch = orchestrator(adapter.clone(), EventSink::disabled())
            .with_policy(RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            });

        let results = orch
            .publish(artifact(), &ids(&["a"]), &CycleProgress::new())
            .await;

        assert_eq!(results[0].error_kind, Some(ErrorKind::TransientNetwork));
        assert_eq!(results[0].attempts, 2);
        assert!(results[0].message.as_deref().unwrap().contains("timed out"));
    }
}
