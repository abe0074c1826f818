//! Per-host rate limiter.

use super::bucket::{BucketSnapshot, LeakyBucket};
use super::clock::{Clock, SystemClock};
use super::config::{RateLimitConfig, RefillResolution};
use super::error::RateLimitResult;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Admission control keyed by destination host.
///
/// The bucket table is built once from configuration and never grows, so
/// lookups need no lock. Each bucket sits behind its own mutex: checks for
/// the same host serialize, checks for different hosts never contend.
/// Hosts without a bucket are always admitted.
pub struct RateLimiter {
    buckets: HashMap<String, Mutex<LeakyBucket>>,
    resolution: RefillResolution,
    clock: Arc<dyn Clock>,
    total_checks: AtomicU64,
    total_allowed: AtomicU64,
    total_denied: AtomicU64,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("hosts", &self.buckets.len())
            .field("resolution", &self.resolution)
            .field("total_checks", &self.total_checks)
            .field("total_allowed", &self.total_allowed)
            .field("total_denied", &self.total_denied)
            .finish()
    }
}

impl RateLimiter {
    /// Build a limiter on the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: &RateLimitConfig) -> RateLimitResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a limiter on the given clock.
    ///
    /// Every configured bucket starts full at the clock's current instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> RateLimitResult<Self> {
        config.validate()?;

        let now = clock.now();
        let shared_window = config.window();
        let buckets = config
            .hosts
            .iter()
            .map(|limit| {
                let bucket = LeakyBucket::new(
                    limit.capacity(),
                    limit.effective_refill_rate(),
                    limit.effective_window(shared_window),
                    now,
                );
                (normalize_host(&limit.host).into_owned(), Mutex::new(bucket))
            })
            .collect();

        Ok(Self {
            buckets,
            resolution: config.refill_resolution,
            clock,
            total_checks: AtomicU64::new(0),
            total_allowed: AtomicU64::new(0),
            total_denied: AtomicU64::new(0),
        })
    }

    /// A limiter that admits everything.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            buckets: HashMap::new(),
            resolution: RefillResolution::default(),
            clock: Arc::new(SystemClock),
            total_checks: AtomicU64::new(0),
            total_allowed: AtomicU64::new(0),
            total_denied: AtomicU64::new(0),
        }
    }

    /// Decide whether a request to `host` is admitted right now.
    ///
    /// Unconfigured hosts return `true` without touching any state.
    /// Configured hosts refill their bucket for the elapsed time and consume
    /// one token on admission.
    pub fn allow(&self, host: &str) -> bool {
        let Some((key, bucket)) = self.bucket_for(host) else {
            trace!(host, "host has no limit");
            return true;
        };

        let mut bucket = lock(bucket);
        let allowed = bucket.try_acquire(self.clock.now(), self.resolution);

        self.total_checks.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.total_allowed.fetch_add(1, Ordering::Relaxed);
            trace!(host = %key, tokens = bucket.tokens(), "request admitted");
        } else {
            self.total_denied.fetch_add(1, Ordering::Relaxed);
            debug!(
                host = %key,
                tokens = bucket.tokens(),
                retry_after_ms = bucket.time_until_available().as_millis() as u64,
                "rate limit exhausted"
            );
        }

        allowed
    }

    /// Whether `host` has a configured limit.
    #[must_use]
    pub fn is_limited(&self, host: &str) -> bool {
        self.bucket_for(host).is_some()
    }

    /// Current state of the bucket for `host`, if it is limited.
    ///
    /// Does not refill; reports the state left by the last admission check.
    #[must_use]
    pub fn snapshot(&self, host: &str) -> Option<BucketSnapshot> {
        self.bucket_for(host)
            .map(|(key, bucket)| BucketSnapshot::of(key, &lock(bucket)))
    }

    /// Snapshots of every configured bucket, sorted by host.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BucketSnapshot> {
        let mut snapshots: Vec<_> = self
            .buckets
            .iter()
            .map(|(host, bucket)| BucketSnapshot::of(host, &lock(bucket)))
            .collect();
        snapshots.sort_by(|a, b| a.host.cmp(&b.host));
        snapshots
    }

    /// Configured hosts, normalized and sorted.
    #[must_use]
    pub fn hosts(&self) -> Vec<&str> {
        let mut hosts: Vec<&str> = self.buckets.keys().map(String::as_str).collect();
        hosts.sort_unstable();
        hosts
    }

    /// Number of hosts with a configured limit.
    #[must_use]
    pub fn limited_host_count(&self) -> usize {
        self.buckets.len()
    }

    /// Refill resolution in use.
    #[must_use]
    pub fn resolution(&self) -> RefillResolution {
        self.resolution
    }

    /// Admission checks made against limited hosts.
    #[must_use]
    pub fn total_checks(&self) -> u64 {
        self.total_checks.load(Ordering::Relaxed)
    }

    /// Checks that admitted the request.
    #[must_use]
    pub fn total_allowed(&self) -> u64 {
        self.total_allowed.load(Ordering::Relaxed)
    }

    /// Checks that rejected the request.
    #[must_use]
    pub fn total_denied(&self) -> u64 {
        self.total_denied.load(Ordering::Relaxed)
    }

    /// Find the bucket for a host, trying the full authority first and the
    /// bare host name (port stripped) second.
    fn bucket_for<'a>(&'a self, host: &str) -> Option<(&'a str, &'a Mutex<LeakyBucket>)> {
        if self.buckets.is_empty() {
            return None;
        }

        let host = normalize_host(host);
        if let Some((key, bucket)) = self.buckets.get_key_value(&*host) {
            return Some((key.as_str(), bucket));
        }

        let bare = strip_port(&host)?;
        self.buckets
            .get_key_value(bare)
            .map(|(key, bucket)| (key.as_str(), bucket))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

fn lock(bucket: &Mutex<LeakyBucket>) -> MutexGuard<'_, LeakyBucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lowercase and trim a host, borrowing when it is already normalized.
fn normalize_host(host: &str) -> Cow<'_, str> {
    let trimmed = host.trim();
    if trimmed.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(trimmed.to_ascii_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// `example.com:8080` -> `example.com`, `[::1]:8080` -> `[::1]`.
fn strip_port(authority: &str) -> Option<&str> {
    let (host, port) = authority.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if host.contains(':') && !host.ends_with(']') {
        return None;
    }
    Some(host)
}
