//! Bounded retry with backoff
//!
//! An explicit combinator replaces declarative retry policies: it takes an
//! operation, a maximum attempt count and a backoff function, and returns
//! the typed result. Only errors classified transient are retried; the rest
//! escalate immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::{IngestError, IngestResult};

/// Backoff schedule for [`retry_with_backoff`]
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Same delay between every attempt
    Fixed(Duration),
    /// Delay doubles per attempt, capped
    Exponential { initial: Duration, cap: Duration },
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, cap } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(cap)
            },
        }
    }
}

/// Run `op` up to `max_attempts` times, sleeping per the backoff schedule
/// between attempts. Non-transient errors abort immediately; the last
/// transient error is returned when attempts are exhausted.
pub async fn retry_with_backoff<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    backoff: Backoff,
    mut op: F,
) -> IngestResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = IngestResult<T>>,
{
    debug_assert!(max_attempts > 0);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = backoff.delay(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(delay).await;
            },
            Err(err) => return Err(err),
        }
    }
}
