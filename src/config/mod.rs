//! # Configuration System
//!
//! TOML configuration for the proxy process: listener, upstream client,
//! per-host rate table and logging. Every section is optional.
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! port = 8000
//!
//! [rate_limits]
//! window_seconds = 60.0
//!
//! [[rate_limits.hosts]]
//! host = "api.twitter.com"
//! requests_per_window = 50.0
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{LogFormat, LogLevel, LogOutput, LoggingConfig, ProxyConfig};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
