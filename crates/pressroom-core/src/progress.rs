use std::sync::{Arc, Mutex};

use crate::types::PublishResult;

/// Terminal results of a cycle collected as they happen, so a cycle cut off
/// by its budget still reports the targets that did finish.
#[derive(Debug, Clone, Default)]
pub struct CycleProgress {
    finished: Arc<Mutex<Vec<PublishResult>>>,
}

impl CycleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: PublishResult) {
        self.finished
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result);
    }

    pub fn snapshot(&self) -> Vec<PublishResult> {
        self.finished
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    #[test]
    fn clones_share_the_same_results() {
        let progress = CycleProgress::new();
        let handle = progress.clone();
        handle.record(PublishResult::failed("a", 1, ErrorKind::Auth, "401"));
        assert_eq!(progress.snapshot().len(), 1);
        assert_eq!(progress.snapshot()[0].target_id, "a");
    }
}
