//! `pressroom-scheduler`: recurring job scheduler with durable run bookkeeping.
//!
//! # Overview
//!
//! Jobs live in a [`store::JobStore`] (SQLite by default). The
//! [`engine::Scheduler`] keeps a write-through copy in memory, polls on a
//! fixed tick, and hands every due job to a [`engine::CycleExecutor`] on its
//! own task. A job's `in_progress` flag is persisted *before* any work
//! starts, so a crash never leads to the same cycle running twice.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                          |
//! |------------|----------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant             |
//! | `Interval` | Repeat every N seconds                             |
//! | `Daily`    | Fire at HH:MM UTC every day                        |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday            |
//! | `Cron`     | 5- or 6-field cron expression, UTC                 |
//!
//! Missed windows are never replayed one by one: a job that was due many
//! times while the process was down fires once, then its next run is
//! computed from the moment it fired.

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod store;
pub mod types;

pub use db::SqliteJobStore;
pub use engine::{CycleExecutor, CycleOutcome, Scheduler};
pub use error::{Result, SchedulerError};
pub use store::{JobStore, MemoryJobStore};
pub use types::{Cycle, Job, JobStatus, RunRecord, RunStatus};
