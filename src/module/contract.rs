//! The core Module Contract trait.

use super::{ModuleConfig, ModuleError, ModuleManifest, ModuleResult, ModuleStatus};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Metrics snapshot reported by a module.
#[derive(Debug, Clone, Default)]
pub struct MetricsPayload {
    /// Counter metrics (monotonically increasing).
    pub counters: BTreeMap<String, u64>,

    /// Gauge metrics (can go up and down).
    pub gauges: BTreeMap<String, f64>,
}

impl MetricsPayload {
    /// Creates a new empty metrics payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counter metric.
    pub fn counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    /// Adds a gauge metric.
    pub fn gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }

    /// Formats metrics in Prometheus text format.
    #[must_use]
    pub fn to_prometheus(&self, prefix: &str) -> String {
        let mut output = String::new();

        for (name, value) in &self.counters {
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        for (name, value) in &self.gauges {
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        output
    }
}

/// The contract every proxy module implements.
///
/// # Lifecycle
///
/// 1. `manifest()` - identity and capabilities
/// 2. `init()` - validate configuration and build internal state
/// 3. `start()` - begin serving
/// 4. `status()` / `metrics()` / `heartbeat()` - ongoing monitoring
/// 5. `reload()` - apply new configuration (optional)
/// 6. `stop()` - graceful shutdown
pub trait ModuleContract: Send + Sync {
    /// Returns the module's manifest.
    fn manifest(&self) -> ModuleManifest;

    /// Initializes the module with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the configuration is invalid and
    /// `ModuleError::InvalidState` if the module was already initialized.
    fn init(&mut self, config: ModuleConfig) -> ModuleResult<()>;

    /// Starts the module.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::InvalidState` if called before `init()` and
    /// `ModuleError::StartFailed` if the module cannot start.
    fn start(&mut self) -> ModuleResult<()>;

    /// Stops the module gracefully.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::InvalidState` if the module is not running.
    fn stop(&mut self) -> ModuleResult<()>;

    /// Reloads the module's configuration.
    ///
    /// # Errors
    ///
    /// The default implementation reports that hot reload is unsupported.
    fn reload(&mut self, _config: ModuleConfig) -> ModuleResult<()> {
        Err(ModuleError::ConfigError(
            "hot reload not supported".to_string(),
        ))
    }

    /// Returns the current status of the module.
    fn status(&self) -> ModuleStatus;

    /// Returns the current metrics from the module.
    fn metrics(&self) -> MetricsPayload;

    /// Liveness check; `true` while the module is operational.
    fn heartbeat(&self) -> bool {
        self.status().is_operational()
    }
}
