//! # Module Contract
//!
//! Every long-lived component of the proxy (the rate limiter and the
//! forwarding listener) implements [`ModuleContract`], giving the binary one
//! uniform way to configure, start, observe and stop them.

mod config;
mod contract;
mod error;
mod manifest;
mod status;

pub use config::ModuleConfig;
pub use contract::{MetricsPayload, ModuleContract};
pub use error::{ModuleError, ModuleResult};
pub use manifest::{Capability, ModuleManifest, ModuleManifestBuilder, SemVer};
pub use status::ModuleStatus;
