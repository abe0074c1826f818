//! Rate limiting module implementing ModuleContract.

use super::clock::{Clock, SystemClock};
use super::config::RateLimitConfig;
use super::limiter::RateLimiter;
use crate::module::{
    Capability, MetricsPayload, ModuleConfig, ModuleContract, ModuleError, ModuleManifest,
    ModuleResult, ModuleStatus,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Lifecycle wrapper around the shared [`RateLimiter`].
///
/// `init` builds the limiter from configuration; the proxy obtains it via
/// [`RateLimitHandler::limiter`] and holds a reference for the life of the
/// process.
pub struct RateLimitHandler {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    limiter: Option<Arc<RateLimiter>>,
    status: ModuleStatus,
    started_at: Option<Instant>,
}

impl std::fmt::Debug for RateLimitHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitHandler")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .field("status", &self.status)
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl RateLimitHandler {
    /// Create a handler with the default (empty) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a handler with the given configuration.
    #[must_use]
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a handler whose limiter runs on `clock`.
    #[must_use]
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            limiter: None,
            status: ModuleStatus::Stopped,
            started_at: None,
        }
    }

    /// The shared limiter, available once initialized.
    #[must_use]
    pub fn limiter(&self) -> Option<Arc<RateLimiter>> {
        self.limiter.clone()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Time since `start`.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }
}

impl Default for RateLimitHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleContract for RateLimitHandler {
    fn manifest(&self) -> ModuleManifest {
        ModuleManifest::builder("rate-limiter")
            .description("Per-host leaky bucket admission control")
            .version(1, 0, 0)
            .capability(Capability::RateLimiting)
            .build()
    }

    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        if self.status != ModuleStatus::Stopped || self.limiter.is_some() {
            return Err(ModuleError::invalid_state(&self.status, "Stopped"));
        }

        debug!("Initializing rate limiter");

        if let Some(parsed) = config
            .parse::<RateLimitConfig>()
            .map_err(|e| ModuleError::ConfigError(format!("failed to parse config: {e}")))?
        {
            self.config = parsed;
        }

        let limiter = RateLimiter::with_clock(&self.config, Arc::clone(&self.clock))
            .map_err(|e| ModuleError::ConfigError(e.to_string()))?;

        for snapshot in limiter.snapshots() {
            info!(
                host = %snapshot.host,
                capacity = snapshot.capacity,
                refill_rate = snapshot.refill_rate,
                window_secs = snapshot.window.as_secs_f64(),
                "Host limit configured"
            );
        }

        self.limiter = Some(Arc::new(limiter));
        self.status = ModuleStatus::Initializing;

        info!(
            hosts = self.config.hosts.len(),
            resolution = ?self.config.refill_resolution,
            "Rate limiter initialized"
        );
        Ok(())
    }

    fn start(&mut self) -> ModuleResult<()> {
        if self.status != ModuleStatus::Initializing {
            return Err(ModuleError::invalid_state(&self.status, "Initializing"));
        }

        self.started_at = Some(Instant::now());
        self.status = ModuleStatus::Running;
        info!("Rate limiter started");
        Ok(())
    }

    fn stop(&mut self) -> ModuleResult<()> {
        if self.status != ModuleStatus::Running {
            return Err(ModuleError::invalid_state(&self.status, "Running"));
        }

        if let Some(ref limiter) = self.limiter {
            info!(
                total_checks = limiter.total_checks(),
                allowed = limiter.total_allowed(),
                denied = limiter.total_denied(),
                "Rate limiter stopping"
            );
        }

        self.status = ModuleStatus::Stopped;
        self.started_at = None;
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        self.status.clone()
    }

    fn metrics(&self) -> MetricsPayload {
        let mut metrics = MetricsPayload::new();

        if let Some(ref limiter) = self.limiter {
            metrics.counter("checks_total", limiter.total_checks());
            metrics.counter("allowed_total", limiter.total_allowed());
            metrics.counter("denied_total", limiter.total_denied());
            metrics.gauge("limited_hosts", limiter.limited_host_count() as f64);

            for snapshot in limiter.snapshots() {
                metrics.gauge(
                    format!("bucket_tokens{{host=\"{}\"}}", snapshot.host),
                    snapshot.tokens,
                );
            }
        }

        if let Some(uptime) = self.uptime() {
            metrics.gauge("uptime_seconds", uptime.as_secs_f64());
        }

        metrics
    }
}
