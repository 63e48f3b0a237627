//! Orchestrator-State: Event Store Backends for the Coverage Orchestrator
//!
//! This crate provides the persistence layer for the orchestrator. It only
//! knows about raw, versioned state-change rows; decoding them into domain
//! events and reducing them is the job of `orchestrator-core`.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: append-only writes guarded by a per-version condition, and two
//! strongly consistent read paths.
//!
//! ## Key Components
//!
//! - `EventStoreClient`: Storage seam (conditional append + two queries)
//! - `StateChangeRecord`: One versioned row for one entity identifier
//! - `MemoryEventStore`: In-memory fake for tests
//! - `SurrealEventStore`: SurrealDB-backed client (unique `(identifier, version)` index)

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_event_store;

pub use error::{StateError, StorageError};
pub use fakes::MemoryEventStore;
pub use handle::{connect_from_env, connect_in_memory, connect_url, CloudConfig};
pub use migrations::init_schema;
pub use storage_traits::{EventStoreClient, StateChangeRecord, StorageResult};
pub use surreal_event_store::SurrealEventStore;

/// Result type for orchestrator-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
