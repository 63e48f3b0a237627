//! Error types for orchestrator-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing the store
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors surfaced by [`crate::EventStoreClient`] operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The conditional write failed: a row already exists at this exact key.
    #[error("state change already exists: {identifier} @ version {version}")]
    AlreadyExists { identifier: String, version: u64 },

    /// The backing store failed (network, query, driver).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A row could not be encoded or decoded by the backend.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether this is the distinguishable "already exists" signal of a
    /// conditional write.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
