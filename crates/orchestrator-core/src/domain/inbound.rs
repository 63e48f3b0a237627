//! Inbound bus events consumed by the orchestrator.
//!
//! Events arrive in the bus envelope shape
//! `{ "detail-type": "<type>", "detail": { ... } }` and are routed by their
//! detail type to exactly one processor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::orchestrated::{CommitCoordinates, EventState, PullRequestContext};

/// Provider-side status of a CI job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
}

impl JobStatus {
    /// Map onto the orchestrated lifecycle: a job is ongoing until the
    /// provider reports it completed.
    pub fn as_event_state(self) -> EventState {
        match self {
            JobStatus::Queued | JobStatus::InProgress => EventState::Ongoing,
            JobStatus::Completed => EventState::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStateChange {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    pub external_id: String,
    pub state: JobStatus,
    pub event_time: DateTime<Utc>,
}

/// Shared detail of `IngestStarted`, `IngestSuccess` and `IngestFailure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEvent {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    pub upload_id: String,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageFinalised {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    pub coverage_percentage: f64,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageFailed {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationFileChange {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    pub event_time: DateTime<Utc>,
}

/// Every event the orchestrator consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detail-type", content = "detail")]
pub enum InboundEvent {
    JobStateChange(JobStateChange),
    IngestStarted(IngestEvent),
    IngestSuccess(IngestEvent),
    IngestFailure(IngestEvent),
    CoverageFinalised(CoverageFinalised),
    CoverageFailed(CoverageFailed),
    ConfigurationFileChange(ConfigurationFileChange),
}

/// Routing key of an [`InboundEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundEventType {
    JobStateChange,
    IngestStarted,
    IngestSuccess,
    IngestFailure,
    CoverageFinalised,
    CoverageFailed,
    ConfigurationFileChange,
}

impl InboundEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundEventType::JobStateChange => "JobStateChange",
            InboundEventType::IngestStarted => "IngestStarted",
            InboundEventType::IngestSuccess => "IngestSuccess",
            InboundEventType::IngestFailure => "IngestFailure",
            InboundEventType::CoverageFinalised => "CoverageFinalised",
            InboundEventType::CoverageFailed => "CoverageFailed",
            InboundEventType::ConfigurationFileChange => "ConfigurationFileChange",
        }
    }
}

impl fmt::Display for InboundEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InboundEvent {
    pub fn event_type(&self) -> InboundEventType {
        match self {
            InboundEvent::JobStateChange(_) => InboundEventType::JobStateChange,
            InboundEvent::IngestStarted(_) => InboundEventType::IngestStarted,
            InboundEvent::IngestSuccess(_) => InboundEventType::IngestSuccess,
            InboundEvent::IngestFailure(_) => InboundEventType::IngestFailure,
            InboundEvent::CoverageFinalised(_) => InboundEventType::CoverageFinalised,
            InboundEvent::CoverageFailed(_) => InboundEventType::CoverageFailed,
            InboundEvent::ConfigurationFileChange(_) => InboundEventType::ConfigurationFileChange,
        }
    }

    pub fn coordinates(&self) -> &CommitCoordinates {
        match self {
            InboundEvent::JobStateChange(e) => &e.coordinates,
            InboundEvent::IngestStarted(e)
            | InboundEvent::IngestSuccess(e)
            | InboundEvent::IngestFailure(e) => &e.coordinates,
            InboundEvent::CoverageFinalised(e) => &e.coordinates,
            InboundEvent::CoverageFailed(e) => &e.coordinates,
            InboundEvent::ConfigurationFileChange(e) => &e.coordinates,
        }
    }
}
