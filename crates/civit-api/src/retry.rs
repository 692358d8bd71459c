use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Retryable;

/// Exponential backoff: attempt `n` waits `base * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_retries, base_delay, max_delay: max_delay.max(base_delay) }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// A server-mandated wait (`Retry-After`), capped at `max_delay`.
    pub fn cap_server_delay(&self, wait: Duration) -> Duration {
        if wait > self.max_delay {
            warn!(
                requested_secs = wait.as_secs(),
                max_ms = self.max_delay.as_millis() as u64,
                "Retry-After exceeds the retry cap; capping"
            );
            return self.max_delay;
        }
        wait
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. `op` receives the zero-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && e.is_retryable() => {
                    let delay = match e.retry_after() {
                        Some(wait) => self.cap_server_delay(wait),
                        None => self.delay_for(attempt),
                    };
                    warn!(
                        what,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(what, attempt, error = %e, "giving up");
                    return Err(e);
                }
            }
        }
    }
}
