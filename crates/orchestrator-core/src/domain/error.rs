//! Domain-level decode errors.

/// Errors produced while decoding a stored state-change payload.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("unknown event kind: {kind}")]
    UnknownKind { kind: String },

    #[error("event kind {kind} has an invalid payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
