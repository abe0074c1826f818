//! # R0N Rate Proxy
//!
//! A transparent HTTP reverse proxy that enforces a per-destination-host
//! leaky-bucket rate limit before forwarding each request to the host it
//! was addressed to.
//!
//! ## Features
//!
//! - Continuous-time leaky bucket per configured host
//! - Default-allow for hosts without a configured limit
//! - Per-host locking with no global lock on the request path
//! - Upstream response minimization to a fixed header allow-list
//! - Optional TLS listener
//!
//! ## Architecture
//!
//! The limiter and the proxy are modules implementing
//! [`module::ModuleContract`] for uniform lifecycle management. The
//! limiter is built once at startup and shared with the proxy handler by
//! reference.

pub mod config;
pub mod logging;
pub mod module;
pub mod modules;
