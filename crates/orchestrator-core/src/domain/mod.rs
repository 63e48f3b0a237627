//! Domain models for the coverage orchestrator.
//!
//! Canonical definitions for the core entities:
//! - `OrchestratedEvent`: point-in-time state of a Job, Ingestion or Finalised commit
//! - `InboundEvent`: domain events consumed from the bus, one processor each
//! - `LifecycleEvent`: events the orchestrator fires (`UploadsStarted`, `UploadsFinalised`)
//! - `PublishableMessage`: user-facing messages handed to the publish queue

pub mod error;
pub mod inbound;
pub mod lifecycle;
pub mod orchestrated;

// Re-export main types and errors
pub use error::EventDecodeError;
pub use inbound::{
    ConfigurationFileChange, CoverageFailed, CoverageFinalised, InboundEvent, InboundEventType,
    IngestEvent, JobStateChange, JobStatus,
};
pub use lifecycle::{
    CoverageFailureMessage, LifecycleEvent, PublishableMessage, UploadsFinalised, UploadsStarted,
    ORCHESTRATOR_SOURCE,
};
pub use orchestrated::{
    CommitCoordinates, EventKind, EventState, Finalised, Ingestion, Job, OrchestratedEvent,
    Provider, PullRequestContext,
};
