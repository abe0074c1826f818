//! Error types for rate limiting.

use thiserror::Error;

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors raised while building a rate limiter.
///
/// Admission checks themselves never fail; only configuration can.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateLimitError {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The same host was configured more than once.
    #[error("duplicate host limit: {0}")]
    DuplicateHost(String),
}

impl RateLimitError {
    /// Check if the error indicates a configuration problem.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::DuplicateHost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RateLimitError::InvalidConfig("window_seconds must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: window_seconds must be positive"
        );

        let err = RateLimitError::DuplicateHost("api.twitter.com".to_string());
        assert_eq!(err.to_string(), "duplicate host limit: api.twitter.com");
        assert!(err.is_config_error());
    }
}
