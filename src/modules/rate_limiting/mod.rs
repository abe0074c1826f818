//! # Rate Limiting Module
//!
//! Per-destination-host leaky bucket admission control.
//!
//! Each configured host owns a bucket holding up to `requests_per_window`
//! tokens that refills continuously over the window. A request to a host
//! consumes one token; an empty bucket rejects. Hosts without a configured
//! limit are never limited.
//!
//! ## Usage
//!
//! ```
//! use r0n_rate_proxy::modules::rate_limiting::{HostLimit, RateLimitConfig, RateLimiter};
//!
//! let config = RateLimitConfig::new()
//!     .with_window_seconds(60.0)
//!     .with_host(HostLimit::new("api.twitter.com", 50.0));
//! let limiter = RateLimiter::new(&config).unwrap();
//!
//! assert!(limiter.allow("api.twitter.com"));
//! assert!(limiter.allow("unlisted.example"));
//! ```

mod bucket;
mod clock;
mod config;
mod error;
mod handler;
mod limiter;

pub use bucket::{BucketSnapshot, LeakyBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HostLimit, RateLimitConfig, RefillResolution};
pub use error::{RateLimitError, RateLimitResult};
pub use handler::RateLimitHandler;
pub use limiter::RateLimiter;
