//! Outbound events fired by the orchestrator and messages handed to the
//! publish queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orchestrated::{CommitCoordinates, PullRequestContext};

/// Source name the orchestrator fires its lifecycle events under.
pub const ORCHESTRATOR_SOURCE: &str = "orchestrator";

/// The first state change for a commit has been observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadsStarted {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    pub event_time: DateTime<Utc>,
}

/// The commit's pipeline reached quiescence and is ready for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadsFinalised {
    pub event_id: Uuid,
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "detail-type", content = "detail")]
pub enum LifecycleEvent {
    UploadsStarted(UploadsStarted),
    UploadsFinalised(UploadsFinalised),
}

impl LifecycleEvent {
    pub fn uploads_started(
        coordinates: CommitCoordinates,
        context: PullRequestContext,
        event_time: DateTime<Utc>,
    ) -> Self {
        LifecycleEvent::UploadsStarted(UploadsStarted {
            event_id: Uuid::new_v4(),
            coordinates,
            context,
            event_time,
        })
    }

    pub fn uploads_finalised(
        coordinates: CommitCoordinates,
        context: PullRequestContext,
        event_time: DateTime<Utc>,
    ) -> Self {
        LifecycleEvent::UploadsFinalised(UploadsFinalised {
            event_id: Uuid::new_v4(),
            coordinates,
            context,
            event_time,
        })
    }

    pub fn detail_type(&self) -> &'static str {
        match self {
            LifecycleEvent::UploadsStarted(_) => "UploadsStarted",
            LifecycleEvent::UploadsFinalised(_) => "UploadsFinalised",
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            LifecycleEvent::UploadsStarted(e) => e.event_id,
            LifecycleEvent::UploadsFinalised(e) => e.event_id,
        }
    }

    pub fn coordinates(&self) -> &CommitCoordinates {
        match self {
            LifecycleEvent::UploadsStarted(e) => &e.coordinates,
            LifecycleEvent::UploadsFinalised(e) => &e.coordinates,
        }
    }
}

/// Coverage analysis failed for a commit; tell the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageFailureMessage {
    #[serde(flatten)]
    pub coordinates: CommitCoordinates,
    #[serde(flatten)]
    pub context: PullRequestContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub event_time: DateTime<Utc>,
}

/// A user-facing message for the publish queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum PublishableMessage {
    CoverageFailure(CoverageFailureMessage),
}
