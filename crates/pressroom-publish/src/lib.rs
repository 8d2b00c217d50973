//! `pressroom-publish`: delivers one artifact to many platforms.
//!
//! [`PublishOrchestrator::publish`] drives each target through a
//! [`PublishAttempt`] state machine: submit via the platform's [`Adapter`],
//! classify the outcome, back off and retry transient failures, and stop
//! on the first permanent one. Adapters are looked up by
//! `platform_kind` in an [`AdapterRegistry`].

pub mod adapter;
pub mod adapters;
pub mod attempt;
pub mod auth;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod registry;
pub mod retry;

pub use adapter::{Adapter, Receipt};
pub use attempt::{InvalidTransition, PublishAttempt};
pub use error::{classify_status, PublishError};
pub use orchestrator::PublishOrchestrator;
pub use registry::AdapterRegistry;
pub use retry::RetryPolicy;
