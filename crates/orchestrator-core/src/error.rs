//! Error taxonomy for the orchestrator.
//!
//! Races the protocol expects (version conflicts, out-of-order events,
//! competing finalisations) are resolved inside the recorder and the
//! readiness evaluator. What reaches a processor's caller as `Err` is an
//! infrastructure failure the invocation framework should redeliver.

use orchestrator_state::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Another writer took this version slot first. Retryable.
    #[error("conditional write conflict: {identifier} @ version {version}")]
    ConditionalWriteConflict { identifier: String, version: u64 },

    /// The event store failed.
    #[error("event store unavailable: {0}")]
    Storage(StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("event bus error: {0}")]
    EventBus(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("configuration file error: {0}")]
    ConfigurationFile(String),

    #[error("no processor registered for {0}")]
    UnroutableEvent(String),
}

impl OrchestratorError {
    pub fn is_conditional_write_conflict(&self) -> bool {
        matches!(self, OrchestratorError::ConditionalWriteConflict { .. })
    }
}

impl From<StorageError> for OrchestratorError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists {
                identifier,
                version,
            } => OrchestratorError::ConditionalWriteConflict {
                identifier,
                version,
            },
            other => OrchestratorError::Storage(other),
        }
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_becomes_conflict() {
        let err: OrchestratorError = StorageError::AlreadyExists {
            identifier: "Job#x".to_string(),
            version: 4,
        }
        .into();
        assert!(err.is_conditional_write_conflict());
        assert!(err.to_string().contains("Job#x @ version 4"));
    }

    #[test]
    fn test_backend_error_stays_storage() {
        let err: OrchestratorError = StorageError::Backend("timeout".to_string()).into();
        assert!(!err.is_conditional_write_conflict());
        assert!(err.to_string().contains("event store unavailable"));
    }
}
