//! Proxy modules.
//!
//! Each module implements [`crate::module::ModuleContract`].
//!
//! - [`rate_limiting`]: per-host leaky bucket admission control
//! - [`proxy`]: pass-through HTTP proxy consulting the limiter

pub mod proxy;
pub mod rate_limiting;
