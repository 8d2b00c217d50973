use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::store::JobStore;
use crate::types::{Job, RunRecord};

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` and `runs` tables (idempotent). `runs` is append-only;
/// `jobs.last_run_status` carries the summary of the newest row.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id              TEXT    NOT NULL PRIMARY KEY,
            name            TEXT    NOT NULL,
            topics          TEXT    NOT NULL,   -- JSON array
            schedule        TEXT    NOT NULL,   -- JSON-encoded Schedule enum
            target_ids      TEXT    NOT NULL,   -- JSON array
            params          TEXT    NOT NULL,   -- JSON-encoded GenerationParams
            status          TEXT    NOT NULL DEFAULT 'active',
            in_progress     INTEGER NOT NULL DEFAULT 0,
            next_run_at     TEXT,               -- RFC 3339 or NULL
            last_run_at     TEXT,
            last_run_status TEXT,
            topic_cursor    INTEGER NOT NULL DEFAULT 0,
            run_count       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS runs (
            id              TEXT    NOT NULL PRIMARY KEY,
            job_id          TEXT    NOT NULL,
            started_at      TEXT    NOT NULL,
            finished_at     TEXT    NOT NULL,
            status          TEXT    NOT NULL,
            artifact_title  TEXT,
            error           TEXT,
            results         TEXT    NOT NULL    -- JSON array of PublishResult
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_runs_job ON runs (job_id);
        ",
    )?;
    Ok(())
}

/// SQLite-backed [`JobStore`]. Wraps a single connection in a `Mutex`;
/// writes are tiny and infrequent (two per cycle).
pub struct SqliteJobStore {
    db: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Wrap `conn`, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }
}

impl JobStore for SqliteJobStore {
    #[instrument(skip(self))]
    fn load_all(&self) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, topics, schedule, target_ids, params, status, in_progress,
                    next_run_at, last_run_at, last_run_status, topic_cursor, run_count,
                    created_at, updated_at
             FROM jobs ORDER BY created_at",
        )?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .filter_map(|r| match r {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!("skipping unreadable job row: {e}");
                    None
                }
            })
            .collect();
        Ok(jobs)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    fn save(&self, job: &Job) -> Result<()> {
        let db = self.db.lock().unwrap();
        upsert_job(&db, job)
    }

    #[instrument(skip(self, job, run), fields(job_id = %job.id, status = %run.status))]
    fn record_run(&self, job: &Job, run: &RunRecord) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO runs
             (id, job_id, started_at, finished_at, status, artifact_title, error, results)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            rusqlite::params![
                run.id,
                run.job_id,
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.status.to_string(),
                run.artifact_title,
                run.error,
                serde_json::to_string(&run.results)?,
            ],
        )?;
        upsert_job(&tx, job)?;
        tx.commit()?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn runs(&self, job_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, job_id, started_at, finished_at, status, artifact_title, error, results
             FROM runs
             WHERE job_id = ?1
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(rusqlite::params![job_id, limit as i64], row_to_run)?
            .filter_map(|r| match r {
                Ok(run) => Some(run),
                Err(e) => {
                    warn!(job_id, "skipping unreadable run row: {e}");
                    None
                }
            })
            .collect();
        Ok(runs)
    }
}

fn upsert_job(conn: &Connection, job: &Job) -> Result<()> {
    conn.execute(
        "INSERT INTO jobs
         (id, name, topics, schedule, target_ids, params, status, in_progress,
          next_run_at, last_run_at, last_run_status, topic_cursor, run_count,
          created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
         ON CONFLICT(id) DO UPDATE SET
            name=excluded.name, topics=excluded.topics, schedule=excluded.schedule,
            target_ids=excluded.target_ids, params=excluded.params, status=excluded.status,
            in_progress=excluded.in_progress, next_run_at=excluded.next_run_at,
            last_run_at=excluded.last_run_at, last_run_status=excluded.last_run_status,
            topic_cursor=excluded.topic_cursor, run_count=excluded.run_count,
            updated_at=excluded.updated_at",
        rusqlite::params![
            job.id,
            job.name,
            serde_json::to_string(&job.topics)?,
            serde_json::to_string(&job.schedule)?,
            serde_json::to_string(&job.target_ids)?,
            serde_json::to_string(&job.params)?,
            job.status.to_string(),
            job.in_progress,
            job.next_run_at.map(|t| t.to_rfc3339()),
            job.last_run_at.map(|t| t.to_rfc3339()),
            job.last_run_status.map(|s| s.to_string()),
            job.topic_cursor,
            job.run_count,
            job.created_at.to_rfc3339(),
            job.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Map a SQLite row to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        topics: json_col(row, 2)?,
        schedule: json_col(row, 3)?,
        target_ids: json_col(row, 4)?,
        params: json_col(row, 5)?,
        status: parsed_col(row, 6)?,
        in_progress: row.get(7)?,
        next_run_at: opt_time_col(row, 8)?,
        last_run_at: opt_time_col(row, 9)?,
        last_run_status: row
            .get::<_, Option<String>>(10)?
            .map(|s| s.parse().map_err(|e: String| conversion_err(10, e)))
            .transpose()?,
        topic_cursor: row.get(11)?,
        run_count: row.get(12)?,
        created_at: time_col(row, 13)?,
        updated_at: time_col(row, 14)?,
    })
}

/// Map a SQLite row to a `RunRecord`.
fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        started_at: time_col(row, 2)?,
        finished_at: time_col(row, 3)?,
        status: parsed_col(row, 4)?,
        artifact_title: row.get(5)?,
        error: row.get(6)?,
        results: json_col(row, 7)?,
    })
}

fn conversion_err(idx: usize, msg: impl Into<String>) -> rusqlite::Error {
    let msg: String = msg.into();
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn json_col<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e.to_string()))
}

fn parsed_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| conversion_err(idx, e))
}

fn time_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_time(&raw).map_err(|e| conversion_err(idx, e))
}

fn opt_time_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_time(&raw).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn parse_time(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {raw:?}: {e}"))
}
