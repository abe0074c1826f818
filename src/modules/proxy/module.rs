//! Proxy module implementing ModuleContract.

use super::config::ProxyModuleConfig;
use super::handler::ProxyHandler;
use super::server::ProxyServer;
use super::tls;
use super::upstream::{HttpUpstream, Upstream};
use crate::modules::rate_limiting::RateLimiter;
use crate::module::{
    Capability, MetricsPayload, ModuleConfig, ModuleContract, ModuleError, ModuleManifest,
    ModuleResult, ModuleStatus,
};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Rate-limiting reverse proxy.
///
/// `init` validates configuration and builds the upstream client; `start`
/// binds the listener and must run inside a tokio runtime.
#[derive(Debug)]
pub struct ProxyModule {
    config: ProxyModuleConfig,
    limiter: Arc<RateLimiter>,
    upstream: Option<Arc<dyn Upstream>>,
    handler: Option<Arc<ProxyHandler>>,
    server: Option<ProxyServer>,
    status: ModuleStatus,
    started_at: Option<Instant>,
}

impl ProxyModule {
    /// Create a module with the default configuration.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self::with_config(ProxyModuleConfig::default(), limiter)
    }

    /// Create a module with the given configuration.
    #[must_use]
    pub fn with_config(config: ProxyModuleConfig, limiter: Arc<RateLimiter>) -> Self {
        Self {
            config,
            limiter,
            upstream: None,
            handler: None,
            server: None,
            status: ModuleStatus::Stopped,
            started_at: None,
        }
    }

    /// Use this upstream instead of building an HTTP client.
    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ProxyModuleConfig {
        &self.config
    }

    /// The request handler, available once initialized.
    #[must_use]
    pub fn handler(&self) -> Option<&Arc<ProxyHandler>> {
        self.handler.as_ref()
    }

    /// Bound listener address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(ProxyServer::local_addr)
    }
}

impl ModuleContract for ProxyModule {
    fn manifest(&self) -> ModuleManifest {
        let mut builder = ModuleManifest::builder("rate-proxy")
            .description("Pass-through HTTP proxy enforcing per-host rate limits")
            .version(1, 0, 0)
            .capability(Capability::HttpProtocol)
            .capability(Capability::RateLimiting);
        if self.config.server.tls.is_some() {
            builder = builder.capability(Capability::TlsTermination);
        }
        builder.build()
    }

    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()> {
        if self.status != ModuleStatus::Stopped || self.handler.is_some() {
            return Err(ModuleError::invalid_state(&self.status, "Stopped"));
        }

        debug!("Initializing proxy");

        if let Some(parsed) = config
            .parse::<ProxyModuleConfig>()
            .map_err(|e| ModuleError::ConfigError(format!("failed to parse config: {e}")))?
        {
            self.config = parsed;
        }

        self.config
            .validate()
            .map_err(|e| ModuleError::ConfigError(e.to_string()))?;

        let upstream: Arc<dyn Upstream> = match self.upstream.clone() {
            Some(upstream) => upstream,
            None => Arc::new(
                HttpUpstream::new(&self.config.upstream)
                    .map_err(|e| ModuleError::ConfigError(e.to_string()))?,
            ),
        };

        let handler = ProxyHandler::new(Arc::clone(&self.limiter), upstream)
            .with_trust_forwarded_proto(self.config.server.trust_forwarded_proto);
        self.handler = Some(Arc::new(handler));
        self.status = ModuleStatus::Initializing;

        info!(
            addr = %self.config.server.bind_addr(),
            limited_hosts = self.limiter.limited_host_count(),
            "Proxy initialized"
        );
        Ok(())
    }

    fn start(&mut self) -> ModuleResult<()> {
        if self.status != ModuleStatus::Initializing {
            return Err(ModuleError::invalid_state(&self.status, "Initializing"));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ModuleError::StartFailed(
                "proxy must be started inside a tokio runtime".to_string(),
            ));
        }

        let handler = self
            .handler
            .clone()
            .ok_or_else(|| ModuleError::Internal("handler missing after init".to_string()))?;

        let mut server = ProxyServer::new(handler);
        if let Some(ref tls_config) = self.config.server.tls {
            let acceptor = tls::load_acceptor(tls_config)
                .map_err(|e| ModuleError::StartFailed(e.to_string()))?;
            server = server.with_tls(acceptor);
        }

        let listener = ProxyServer::bind(&self.config.server.bind_addr())
            .map_err(|e| ModuleError::StartFailed(e.to_string()))?;
        server
            .serve(listener)
            .map_err(|e| ModuleError::StartFailed(e.to_string()))?;

        self.server = Some(server);
        self.started_at = Some(Instant::now());
        self.status = ModuleStatus::Running;
        Ok(())
    }

    fn stop(&mut self) -> ModuleResult<()> {
        if self.status != ModuleStatus::Running {
            return Err(ModuleError::invalid_state(&self.status, "Running"));
        }

        if let Some(mut server) = self.server.take() {
            server
                .stop()
                .map_err(|e| ModuleError::Internal(e.to_string()))?;
        }

        self.status = ModuleStatus::Stopped;
        self.started_at = None;
        info!("Proxy stopped");
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        self.status.clone()
    }

    fn metrics(&self) -> MetricsPayload {
        let mut metrics = MetricsPayload::new();

        if let Some(ref handler) = self.handler {
            let stats = handler.stats();
            let load = |counter: &std::sync::atomic::AtomicU64| counter.load(Ordering::Relaxed);

            metrics.counter("requests_total", load(&stats.requests_total));
            metrics.counter("forwarded_total", load(&stats.forwarded));
            metrics.counter("rate_limited_total", load(&stats.rate_limited));
            metrics.counter(
                "upstream_rate_limited_total",
                load(&stats.upstream_rate_limited),
            );
            metrics.counter("transport_failures_total", load(&stats.transport_failures));
            metrics.counter("scheme_failures_total", load(&stats.scheme_failures));
            metrics.counter("bad_requests_total", load(&stats.bad_requests));
            metrics.gauge(
                "active_connections",
                load(&stats.active_connections) as f64,
            );
        }

        if let Some(started_at) = self.started_at {
            metrics.gauge("uptime_seconds", started_at.elapsed().as_secs_f64());
        }

        metrics
    }
}
