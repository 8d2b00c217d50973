//! Shared building blocks for the pressroom workspace: configuration,
//! the top-level error type, domain types passed between the scheduler and
//! the publish engine, and the status events broadcast to observers.

pub mod config;
pub mod error;
pub mod events;
pub mod progress;
pub mod types;

pub use error::{PressroomError, Result};
pub use events::{EventKind, EventSink, StatusEvent};
pub use progress::CycleProgress;
pub use types::{
    Artifact, AttemptState, AuthScheme, ErrorKind, GenerationParams, PublishResult, PublishTarget,
    Schedule, WritingStyle,
};
