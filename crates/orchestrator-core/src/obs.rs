//! Structured observability hooks for commit orchestration.
//!
//! This module provides:
//! - Commit-scoped tracing spans via `CommitSpan`, attached to a processor's
//!   future rather than entered on the current thread
//! - Emission functions with stable `event` keys for recording, finalisation,
//!   lifecycle and routing outcomes
//!
//! Expected races (out-of-order events, competing finalisations) log at
//! `info!`. Wiring bugs and exhausted retry budgets log at `error!` so they
//! alert.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{error, info, Instrument, Span};

/// Span covering one processor invocation for a commit.
///
/// # Example
///
/// ```ignore
/// CommitSpan::new("owner-github-repo", "abc123")
///     .instrument(self.handle(change))
///     .await
/// // every tracing call inside handle() carries repository_identifier and commit
/// ```
pub struct CommitSpan {
    span: Span,
}

impl CommitSpan {
    /// Create a span tagged with the repository identifier and commit.
    pub fn new(repository_identifier: &str, commit: &str) -> Self {
        let span = tracing::info_span!(
            "orchestrator.commit",
            repository_identifier = %repository_identifier,
            commit = %commit,
        );
        Self { span }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `future` inside this span. The span is entered on every poll, so
    /// it follows the future across threads and never leaks onto other tasks.
    pub fn instrument<F: Future>(self, future: F) -> Instrumented<F> {
        future.instrument(self.span)
    }
}

/// Emit event: a new state change was appended.
pub fn emit_state_change_recorded(identifier: &str, version: u64, attempts: u32) {
    info!(
        event = "state_change.recorded",
        identifier = %identifier,
        version = version,
        attempts = attempts,
    );
}

/// Emit event: an incoming state was older than the stored state and dropped.
pub fn emit_state_change_out_of_order(identifier: &str, stored_time: i64, incoming_time: i64) {
    info!(
        event = "state_change.out_of_order",
        identifier = %identifier,
        stored_time = stored_time,
        incoming_time = incoming_time,
    );
}

/// Emit event: the incoming state equals the stored state, nothing written.
pub fn emit_state_change_unchanged(identifier: &str) {
    info!(event = "state_change.unchanged", identifier = %identifier);
}

/// Emit event: the recorder ran out of retries under write contention.
pub fn emit_contention_exhausted(identifier: &str, attempts: u32) {
    error!(
        event = "state_change.contention_exhausted",
        identifier = %identifier,
        attempts = attempts,
    );
}

/// Emit event: this invocation won the finalisation slot.
pub fn emit_finalisation_claimed(identifier: &str, version: u64) {
    info!(
        event = "finalisation.claimed",
        identifier = %identifier,
        version = version,
    );
}

/// Emit event: another writer finalised the commit first.
pub fn emit_finalisation_already_claimed(identifier: &str) {
    info!(event = "finalisation.already_claimed", identifier = %identifier);
}

/// Emit event: a lifecycle event went out on the bus.
pub fn emit_lifecycle_fired(detail_type: &str, event_id: &str, commit: &str) {
    info!(
        event = "lifecycle.fired",
        detail_type = %detail_type,
        event_id = %event_id,
        commit = %commit,
    );
}

/// Emit event: a processor received an event it does not handle.
pub fn emit_routing_mismatch(processor: &str, received: &str) {
    error!(
        event = "routing.mismatch",
        processor = %processor,
        received = %received,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[tracing_test::traced_test]
    fn test_commit_span_create() {
        let span = CommitSpan::new("owner-github-repo", "abc123");
        assert_eq!(
            span.span().metadata().map(|m| m.name()),
            Some("orchestrator.commit")
        );
    }

    #[tokio::test]
    async fn test_instrumented_future_is_send() {
        fn assert_send<T: Send>(value: T) -> T {
            value
        }
        let value = assert_send(CommitSpan::new("owner-github-repo", "abc123").instrument(async {
            tokio::task::yield_now().await;
            7
        }))
        .await;
        assert_eq!(value, 7);
    }
}
