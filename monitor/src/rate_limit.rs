//! Outgoing webhook pacing using the token bucket algorithm.
//!
//! Chat webhooks reject bursts, so every notification waits for a token
//! before it is sent:
//! - The bucket holds up to `capacity` tokens and starts full
//! - Tokens are added at `rate` tokens per second
//! - Each send consumes one token; when none is left the sender sleeps until one is

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Default send rate: two notifications per second.
pub const DEFAULT_RATE: f64 = 2.0;

/// Default bucket capacity: no bursts beyond a single message.
pub const DEFAULT_CAPACITY: u32 = 1;

/// A token bucket tracking one webhook's budget.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Current number of tokens in the bucket.
    tokens: f64,

    /// Time of the last token refill.
    last_refill: Instant,

    /// Maximum number of tokens the bucket can hold.
    capacity: u32,

    /// Rate at which tokens are added (tokens per second).
    rate: f64,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// Non-positive or non-finite rates fall back to [`DEFAULT_RATE`] and a
    /// zero capacity is raised to one.
    pub fn new(rate: f64, capacity: u32) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            DEFAULT_RATE
        };
        let capacity = capacity.max(1);

        Self {
            tokens: f64::from(capacity),
            last_refill: Instant::now(),
            capacity,
            rate,
        }
    }

    /// Attempts to consume a token.
    ///
    /// Returns `None` if a token was consumed, or the time until the next
    /// token becomes available.
    pub fn try_consume(&mut self) -> Option<Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(tokens_needed / self.rate))
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed_secs * self.rate).min(f64::from(self.capacity));
        self.last_refill = now;
    }

    #[cfg(test)]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[cfg(test)]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Shared, awaitable token bucket.
///
/// Cloning is cheap; clones draw from the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<TokenBucket>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `rate` sends per second with bursts of `capacity`.
    pub fn new(rate: f64, capacity: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TokenBucket::new(rate, capacity))),
        }
    }

    /// Creates a limiter with [`DEFAULT_CAPACITY`].
    pub fn with_rate(rate: f64) -> Self {
        Self::new(rate, DEFAULT_CAPACITY)
    }

    /// Waits until a token is available and consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = self.inner.lock().await.try_consume();
            match wait {
                None => return,
                Some(delay) => {
                    trace!(delay_ms = delay.as_millis() as u64, "Waiting for send budget");
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE, DEFAULT_CAPACITY)
    }
}
