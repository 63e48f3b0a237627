//! Retry policies: exponential backoff with jitter for write contention,
//! constant-interval polling for commit quiescence.
//!
//! A [`BackoffStrategy`] drives an async closure. Each call receives the
//! 1-based attempt number and answers [`Attempt::Done`] to stop or
//! [`Attempt::Retry`] to go again. Errors from the closure abort the run
//! immediately. When the attempt or wall-clock budget runs out the last
//! `Retry` value is returned with `exhausted = true`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::Result;

/// What one attempt decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// Stop with this value.
    Done(T),
    /// Not settled yet; this value stands if the budget runs out.
    Retry(T),
}

/// Result of [`BackoffStrategy::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffOutcome<T> {
    pub value: T,
    /// Number of attempts made (1 = no retries used).
    pub attempts: u32,
    /// `true` when the run stopped because the budget was spent.
    pub exhausted: bool,
}

/// Delay curve and budget of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Maximum number of attempts (values below 1 are treated as 1).
    pub max_attempts: u32,
    /// Delay after the first attempt (milliseconds).
    pub base_delay_ms: u64,
    /// Upper bound on a single delay before jitter (milliseconds).
    pub max_delay_ms: u64,
    /// Growth factor per attempt. `1.0` gives a constant interval.
    pub multiplier: f64,
    /// Random jitter added to each delay, `0..=jitter_ms`.
    pub jitter_ms: u64,
    /// Wall-clock budget for the whole run; `0` disables the bound.
    pub max_elapsed_ms: u64,
}

impl BackoffConfig {
    pub fn event_store_recorder() -> Self {
        Self {
            max_attempts: 8,
            base_delay_ms: 50,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter_ms: 50,
            max_elapsed_ms: 5_000,
        }
    }

    pub fn ready_to_finalise() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 3_000,
            max_delay_ms: 3_000,
            multiplier: 1.0,
            jitter_ms: 0,
            max_elapsed_ms: 30_000,
        }
    }
}

/// A named retry policy.
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    name: &'static str,
    config: BackoffConfig,
}

impl BackoffStrategy {
    pub fn new(name: &'static str, config: BackoffConfig) -> Self {
        Self { name, config }
    }

    /// Resolves version collisions on the event store.
    pub fn event_store_recorder() -> Self {
        Self::new("event_store_recorder", BackoffConfig::event_store_recorder())
    }

    /// Polls a commit until its pipeline is quiescent.
    pub fn ready_to_finalise() -> Self {
        Self::new("ready_to_finalise", BackoffConfig::ready_to_finalise())
    }

    /// Zero-delay strategy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(
            "immediate",
            BackoffConfig {
                max_attempts,
                base_delay_ms: 0,
                max_delay_ms: 0,
                multiplier: 1.0,
                jitter_ms: 0,
                max_elapsed_ms: 0,
            },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay to wait after `attempt` failed to settle, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let capped = scaled.min(self.config.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        self.base_delay_for(attempt) + Duration::from_millis(jitter)
    }

    /// Run `op` until it answers [`Attempt::Done`] or the budget is spent.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<BackoffOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let budget = Duration::from_millis(self.config.max_elapsed_ms);
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            let value = match op(attempt).await? {
                Attempt::Done(value) => {
                    return Ok(BackoffOutcome {
                        value,
                        attempts: attempt,
                        exhausted: false,
                    });
                }
                Attempt::Retry(value) => value,
            };

            if attempt >= max_attempts {
                debug!(strategy = self.name, attempt, "attempt budget exhausted");
                return Ok(BackoffOutcome {
                    value,
                    attempts: attempt,
                    exhausted: true,
                });
            }

            let delay = self.delay_for(attempt);
            if !budget.is_zero() && started.elapsed() + delay > budget {
                debug!(strategy = self.name, attempt, "time budget exhausted");
                return Ok(BackoffOutcome {
                    value,
                    attempts: attempt,
                    exhausted: true,
                });
            }

            debug!(
                strategy = self.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
