use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The provided schedule definition is invalid or unsupported.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The job definition is unusable (no topics, no targets, …).
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// A job with this ID is already registered.
    #[error("Job already exists: {id}")]
    DuplicateJob { id: String },

    /// The job already has a cycle in flight.
    #[error("Job already running: {id}")]
    AlreadyRunning { id: String },

    /// The job is paused and cannot be triggered.
    #[error("Job paused: {id}")]
    Paused { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
