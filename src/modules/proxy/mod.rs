//! # Proxy Module
//!
//! Pass-through HTTP proxy that checks the per-host rate limiter before
//! forwarding each request to the host it was addressed to.
//!
//! ## Request flow
//!
//! 1. The target host comes from the request authority or `Host` header.
//! 2. [`RateLimiter::allow`](crate::modules::rate_limiting::RateLimiter::allow)
//!    decides admission; a rejection answers 429 with a fixed body.
//! 3. The upstream scheme comes from `X-Forwarded-Proto` (exactly `http` or
//!    `https`) or the inbound connection; neither answers 500.
//! 4. Method, headers and body are sent upstream unchanged.
//! 5. The upstream status and body come back with only `Date`,
//!    `Cache-Control`, `Server`, `Content-Type` and `Location`. An upstream
//!    429 is replaced with the local rejection. No response at all answers
//!    500 with an empty body.

mod config;
mod error;
mod handler;
mod module;
mod response;
mod scheme;
mod server;
mod tls;
mod upstream;

pub use config::{
    ProxyModuleConfig, ServerConfig, TlsConfig, UpstreamConfig, FORWARDED_RESPONSE_HEADERS,
    RATE_LIMITED_BODY,
};
pub use error::{ProxyError, ProxyResult};
pub use handler::{ProxyHandler, ProxyStats};
pub use module::ProxyModule;
pub use response::{bad_request, internal_error, rate_limited, translate, ProxyResponse};
pub use scheme::{resolve as resolve_scheme, ConnectionInfo, Scheme, X_FORWARDED_PROTO};
pub use server::ProxyServer;
pub use tls::load_acceptor;
pub use upstream::{HttpUpstream, Upstream, UpstreamRequest, UpstreamResponse};
