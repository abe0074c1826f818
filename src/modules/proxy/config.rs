//! Configuration types for the proxy module.

use super::error::{ProxyError, ProxyResult};
use http::header::{self, HeaderName};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upstream response headers passed through to the caller.
pub const FORWARDED_RESPONSE_HEADERS: [HeaderName; 5] = [
    header::DATE,
    header::CACHE_CONTROL,
    header::SERVER,
    header::CONTENT_TYPE,
    header::LOCATION,
];

/// Body of every 429 the proxy returns, local or upstream.
pub const RATE_LIMITED_BODY: &str =
    "Request cannot be served due to the application's rate limit having been exhausted for the resource";

/// Settings consumed by [`super::ProxyModule`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyModuleConfig {
    /// Inbound listener.
    pub server: ServerConfig,
    /// Upstream client.
    pub upstream: UpstreamConfig,
}

impl ProxyModuleConfig {
    /// Validate both sections.
    pub fn validate(&self) -> ProxyResult<()> {
        self.server.validate()?;
        self.upstream.validate()
    }
}

/// Inbound listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub address: String,

    /// Listen port.
    pub port: u16,

    /// Honor `X-Forwarded-Proto` when it is exactly `http` or `https`.
    pub trust_forwarded_proto: bool,

    /// Serve HTTPS with this certificate instead of plain HTTP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8000,
            trust_forwarded_proto: true,
            tls: None,
        }
    }
}

impl ServerConfig {
    /// `address:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Validate the listener settings.
    ///
    /// Port 0 is accepted here so tests can bind an ephemeral port; the
    /// process-level validator rejects it.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.address.trim().is_empty() {
            return Err(ProxyError::InvalidConfig(
                "server.address must not be empty".to_string(),
            ));
        }
        if let Some(ref tls) = self.tls {
            tls.validate()?;
        }
        Ok(())
    }
}

/// PEM certificate chain and private key for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate chain.
    pub cert_path: PathBuf,
    /// Private key.
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// Create a TLS configuration.
    #[must_use]
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    fn validate(&self) -> ProxyResult<()> {
        if self.cert_path.as_os_str().is_empty() {
            return Err(ProxyError::InvalidConfig(
                "server.tls.cert_path must not be empty".to_string(),
            ));
        }
        if self.key_path.as_os_str().is_empty() {
            return Err(ProxyError::InvalidConfig(
                "server.tls.key_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Upstream client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Follow upstream redirects.
    pub follow_redirects: bool,

    /// Redirect hop limit when following.
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 60,
            request_timeout_secs: 60,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

impl UpstreamConfig {
    /// Connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the timeouts.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.connect_timeout_secs == 0 {
            return Err(ProxyError::InvalidConfig(
                "upstream.connect_timeout_secs must be positive".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ProxyError::InvalidConfig(
                "upstream.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
