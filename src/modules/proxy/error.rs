//! Error types for the proxy module.

use thiserror::Error;

/// Errors raised while proxying a request or running the listener.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Neither the forwarded protocol nor the connection names http/https.
    #[error("cannot determine upstream scheme")]
    SchemeAmbiguous,

    /// The request names no target host.
    #[error("request has no target host")]
    MissingHost,

    /// The upstream request could not be built.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// No well-formed HTTP response came back from upstream.
    #[error("upstream transport failure: {0}")]
    Transport(String),

    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// Listener bind failure.
    #[error("failed to bind {addr}: {message}")]
    Bind {
        /// Address.
        addr: String,
        /// Error message.
        message: String,
    },

    /// Certificate or key loading failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Server already running.
    #[error("server already running")]
    AlreadyRunning,

    /// Server not running.
    #[error("server not running")]
    NotRunning,
}

impl ProxyError {
    /// Returns `true` if this error answers the caller with 400.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingHost | Self::BodyRead(_))
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
