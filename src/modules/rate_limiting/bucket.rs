//! Leaky bucket state for a single host.

use super::config::RefillResolution;
use std::time::{Duration, Instant};

/// Per-host leaky bucket.
///
/// Holds up to `capacity` tokens and restores `refill_rate` tokens per
/// `window`, continuously. Each admitted request consumes one token.
/// `tokens` stays within `[0, capacity]` after every operation.
///
/// The bucket itself is not synchronized; [`super::RateLimiter`] wraps each
/// one in its own mutex.
#[derive(Debug, Clone)]
pub struct LeakyBucket {
    capacity: f64,
    refill_rate: f64,
    window: Duration,
    tokens: f64,
    last_refill: Instant,
}

impl LeakyBucket {
    /// Create a full bucket.
    ///
    /// Callers validate that `capacity`, `refill_rate` and `window` are
    /// positive; see [`super::RateLimitConfig::validate`].
    #[must_use]
    pub fn new(capacity: f64, refill_rate: f64, window: Duration, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            window,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill for the time elapsed since the last refill.
    ///
    /// `last_refill` always moves to `now`. An instant earlier than the last
    /// refill counts as zero elapsed time.
    pub fn refill(&mut self, now: Instant, resolution: RefillResolution) {
        let elapsed = resolution.elapsed_secs(now.saturating_duration_since(self.last_refill));
        self.last_refill = now;

        let refilled = self.tokens + elapsed * self.refill_per_second();
        self.tokens = refilled.min(self.capacity).max(0.0);
    }

    /// Refill, then take one token if at least one is available.
    ///
    /// Returns `true` if the request is admitted.
    pub fn try_acquire(&mut self, now: Instant, resolution: RefillResolution) -> bool {
        self.refill(now, resolution);

        if self.tokens < 1.0 {
            return false;
        }

        self.tokens -= 1.0;
        true
    }

    /// Tokens restored per second.
    #[inline]
    #[must_use]
    pub fn refill_per_second(&self) -> f64 {
        self.refill_rate / self.window.as_secs_f64()
    }

    /// Time until one whole token will be available, ignoring refill
    /// quantization. Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }

        Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_per_second())
            .unwrap_or(Duration::MAX)
    }

    /// Current token count as of the last refill.
    #[must_use]
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Maximum tokens.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens restored per window.
    #[must_use]
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Refill window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Instant of the last refill computation.
    #[must_use]
    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }
}

/// Point-in-time view of a host's bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSnapshot {
    /// Host the bucket belongs to.
    pub host: String,
    /// Tokens as of the last admission check.
    pub tokens: f64,
    /// Maximum tokens.
    pub capacity: f64,
    /// Tokens restored per window.
    pub refill_rate: f64,
    /// Refill window.
    pub window: Duration,
}

impl BucketSnapshot {
    pub(crate) fn of(host: &str, bucket: &LeakyBucket) -> Self {
        Self {
            host: host.to_string(),
            tokens: bucket.tokens(),
            capacity: bucket.capacity(),
            refill_rate: bucket.refill_rate(),
            window: bucket.window(),
        }
    }
}
