//! Token-bucket request limiter.
//!
//! The bucket holds up to `burst` tokens and refills at `rate` tokens per
//! second. [`RateLimiter::acquire`] sleeps until a token is available; a 429
//! from the server calls [`RateLimiter::penalize`] so every caller backs off,
//! not just the one that saw the response.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Option<Mutex<Bucket>>,
}

impl RateLimiter {
    /// `rate` requests per second with bursts of up to `burst`. A rate of
    /// zero (or less) disables limiting.
    pub fn new(rate: f64, burst: u32) -> Self {
        if rate <= 0.0 || !rate.is_finite() {
            return Self::unlimited();
        }
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            burst,
            bucket: Some(Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
                blocked_until: None,
            })),
        }
    }

    pub fn unlimited() -> Self {
        Self { rate: 0.0, burst: 0.0, bucket: None }
    }

    pub fn is_limited(&self) -> bool {
        self.bucket.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Wait until one request may be sent.
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        loop {
            let wait = {
                let mut b = bucket.lock().await;
                let now = Instant::now();
                match b.blocked_until {
                    Some(until) if until > now => until - now,
                    _ => {
                        b.blocked_until = None;
                        let elapsed = now.saturating_duration_since(b.last_refill).as_secs_f64();
                        b.tokens = (b.tokens + elapsed * self.rate).min(self.burst);
                        b.last_refill = now;
                        if b.tokens >= 1.0 {
                            b.tokens -= 1.0;
                            return;
                        }
                        Duration::from_secs_f64((1.0 - b.tokens) / self.rate)
                    }
                }
            };
            trace!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Block every caller for `delay` and drain the bucket.
    pub async fn penalize(&self, delay: Duration) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        let mut b = bucket.lock().await;
        let until = Instant::now() + delay;
        if b.blocked_until.is_none_or(|cur| cur < until) {
            b.blocked_until = Some(until);
        }
        b.tokens = 0.0;
        b.last_refill = until;
    }
}
