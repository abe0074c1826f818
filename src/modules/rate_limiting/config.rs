//! Configuration for per-host rate limiting.

use super::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Rate limiting section of the proxy configuration.
///
/// Immutable once a [`super::RateLimiter`] has been built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Refill window shared by every host without its own override.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,

    /// How elapsed time is measured when refilling a bucket.
    #[serde(default)]
    pub refill_resolution: RefillResolution,

    /// Hosts with a configured limit. Any other host is unlimited.
    #[serde(default)]
    pub hosts: Vec<HostLimit>,
}

fn default_window_seconds() -> f64 {
    60.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            refill_resolution: RefillResolution::default(),
            hosts: Vec::new(),
        }
    }
}

impl RateLimitConfig {
    /// Create a config with the default 60 second window and no limited hosts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shared refill window.
    #[must_use]
    pub fn with_window_seconds(mut self, seconds: f64) -> Self {
        self.window_seconds = seconds;
        self
    }

    /// Set the refill resolution.
    #[must_use]
    pub fn with_refill_resolution(mut self, resolution: RefillResolution) -> Self {
        self.refill_resolution = resolution;
        self
    }

    /// Add a host limit.
    #[must_use]
    pub fn with_host(mut self, limit: HostLimit) -> Self {
        self.hosts.push(limit);
        self
    }

    /// The shared window as a [`Duration`].
    ///
    /// Saturates at [`Duration::MAX`] for values [`Self::validate`] rejects.
    #[must_use]
    pub fn window(&self) -> Duration {
        saturating_secs(self.window_seconds)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] for non-positive or
    /// non-finite numbers, windows too long to represent as a [`Duration`]
    /// and empty host names, and
    /// [`RateLimitError::DuplicateHost`] when a host appears twice
    /// (case-insensitively).
    pub fn validate(&self) -> RateLimitResult<()> {
        if window_duration(self.window_seconds).is_none() {
            return Err(RateLimitError::InvalidConfig(format!(
                "window_seconds must be a positive number of seconds, got {}",
                self.window_seconds
            )));
        }

        let mut seen = HashSet::with_capacity(self.hosts.len());
        for limit in &self.hosts {
            limit.validate()?;
            if !seen.insert(limit.host.trim().to_ascii_lowercase()) {
                return Err(RateLimitError::DuplicateHost(limit.host.clone()));
            }
        }

        Ok(())
    }
}

/// How the elapsed time since the last refill is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefillResolution {
    /// Full-resolution elapsed time; fractional seconds accrue tokens.
    #[default]
    Fractional,

    /// Elapsed time truncated to whole seconds before refilling.
    ///
    /// Requests spaced less than a second apart accrue nothing, which
    /// under-refills high-frequency traffic.
    WholeSeconds,
}

impl RefillResolution {
    /// Elapsed seconds as seen by the refill computation.
    #[inline]
    #[must_use]
    pub fn elapsed_secs(self, elapsed: Duration) -> f64 {
        match self {
            Self::Fractional => elapsed.as_secs_f64(),
            Self::WholeSeconds => elapsed.as_secs() as f64,
        }
    }
}

/// Limit for a single destination host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostLimit {
    /// Host name (or `host:port` authority) the limit applies to.
    pub host: String,

    /// Requests admitted per window; also the bucket capacity.
    pub requests_per_window: f64,

    /// Tokens restored per window. Defaults to `requests_per_window`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refill_rate: Option<f64>,

    /// Per-host window override, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<f64>,
}

impl HostLimit {
    /// Create a limit of `requests_per_window` for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, requests_per_window: f64) -> Self {
        Self {
            host: host.into(),
            requests_per_window,
            refill_rate: None,
            window_seconds: None,
        }
    }

    /// Override the refill rate.
    #[must_use]
    pub fn with_refill_rate(mut self, refill_rate: f64) -> Self {
        self.refill_rate = Some(refill_rate);
        self
    }

    /// Override the refill window for this host.
    #[must_use]
    pub fn with_window_seconds(mut self, seconds: f64) -> Self {
        self.window_seconds = Some(seconds);
        self
    }

    /// Bucket capacity.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.requests_per_window
    }

    /// Tokens restored per window.
    #[must_use]
    pub fn effective_refill_rate(&self) -> f64 {
        self.refill_rate.unwrap_or(self.requests_per_window)
    }

    /// Window for this host, falling back to the shared one.
    #[must_use]
    pub fn effective_window(&self, shared: Duration) -> Duration {
        self.window_seconds.map_or(shared, saturating_secs)
    }

    /// Validate the limit.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] describing the bad field.
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.host.trim().is_empty() {
            return Err(RateLimitError::InvalidConfig(
                "host must not be empty".to_string(),
            ));
        }

        if !is_positive(self.requests_per_window) {
            return Err(RateLimitError::InvalidConfig(format!(
                "host {}: requests_per_window must be a positive number",
                self.host
            )));
        }

        if let Some(rate) = self.refill_rate {
            if !is_positive(rate) {
                return Err(RateLimitError::InvalidConfig(format!(
                    "host {}: refill_rate must be a positive number",
                    self.host
                )));
            }
        }

        if let Some(window) = self.window_seconds {
            if window_duration(window).is_none() {
                return Err(RateLimitError::InvalidConfig(format!(
                    "host {}: window_seconds must be a positive number of seconds",
                    self.host
                )));
            }
        }

        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// A window in seconds as a non-zero [`Duration`], if representable.
fn window_duration(seconds: f64) -> Option<Duration> {
    if !is_positive(seconds) {
        return None;
    }
    Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|window| !window.is_zero())
}

fn saturating_secs(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}
