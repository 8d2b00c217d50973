//! A process that dies mid-cycle leaves `in_progress` set on disk; the next
//! process must close that run out exactly once and carry on.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pressroom_core::{EventSink, GenerationParams, Schedule};
use pressroom_scheduler::{Job, RunStatus, Scheduler, SqliteJobStore};
use rusqlite::Connection;

fn open(path: &std::path::Path) -> Arc<SqliteJobStore> {
    Arc::new(SqliteJobStore::new(Connection::open(path).unwrap()).unwrap())
}

#[test]
fn crash_mid_cycle_is_recovered_once_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("pressroom.db");

    // First process: claim a cycle, then "crash" without completing it.
    {
        let sched = Scheduler::load(open(&db), EventSink::disabled()).unwrap();
        let mut job = Job::new(
            "nightly",
            "Nightly post",
            vec!["databases".into()],
            Schedule::Interval { every_secs: 3600 },
            vec!["blog".into(), "medium".into(), "site".into()],
            GenerationParams::default(),
        );
        job.created_at = Utc::now() - Duration::hours(2);
        sched.register(job).unwrap();

        let cycle = sched.mark_running("nightly", Utc::now()).unwrap();
        assert!(cycle.job.in_progress);
    }

    // Second process: recovery happens during load.
    {
        let sched = Scheduler::load(open(&db), EventSink::disabled()).unwrap();
        let job = sched.get("nightly").unwrap();
        assert!(!job.in_progress);
        assert_eq!(job.run_count, 1);
        assert!(sched.due_jobs(Utc::now()).is_empty(), "no blind re-trigger");

        let runs = sched.runs("nightly", 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Interrupted);
        assert_eq!(runs[0].results.len(), 3);
        assert_eq!(runs[0].error.as_deref(), Some("interrupted by restart"));
    }

    // Third process: nothing left to recover.
    let sched = Scheduler::load(open(&db), EventSink::disabled()).unwrap();
    assert_eq!(sched.runs("nightly", 10).unwrap().len(), 1);
}
