//! Coverage Orchestrator Core Library
//!
//! Event-sourced state reconciliation for the coverage pipeline. Inbound bus
//! events become versioned state changes in an append-only event store; the
//! reduced state of every entity for a commit decides when the commit is
//! announced (`UploadsStarted`) and when it is finalised (`UploadsFinalised`).

pub mod backoff;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod event_store;
pub mod obs;
pub mod processor;
pub mod readiness;
pub mod recorder;
pub mod router;
pub mod telemetry;

pub use backoff::{Attempt, BackoffConfig, BackoffOutcome, BackoffStrategy};
pub use client::{
    EventBusClient, HttpEventBus, HttpPublishClient, MemoryEventBus, MemoryPublishClient,
    PublishClient, TracingEventBus, TracingPublishClient,
};
pub use config::OrchestratorConfig;
pub use domain::{
    CommitCoordinates, EventKind, EventState, Finalised, InboundEvent, InboundEventType,
    Ingestion, Job, LifecycleEvent, OrchestratedEvent, Provider, PublishableMessage,
    PullRequestContext,
};
pub use error::{OrchestratorError, Result};
pub use event_store::{EventStateChangeCollection, EventStoreService};
pub use processor::{EventProcessor, OrchestratorServices};
pub use readiness::{CommitReadinessEvaluator, FinalisationSlot};
pub use recorder::{RecordOutcome, StateChangeRecorder};
pub use router::EventRouter;

pub use orchestrator_state::{EventStoreClient, MemoryEventStore, SurrealEventStore};
