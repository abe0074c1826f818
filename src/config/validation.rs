//! Configuration validation system.

use super::types::ProxyConfig;

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Configuration is invalid.
    Error,
    /// Configuration loads but probably does not do what was meant.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    findings: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding.
    pub fn add(&mut self, finding: ValidationError) {
        self.findings.push(finding);
    }

    /// No error-severity findings.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Error-severity findings.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.findings
            .iter()
            .filter(|f| f.severity == ValidationSeverity::Error)
    }

    /// Warning-severity findings.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationError> {
        self.findings
            .iter()
            .filter(|f| f.severity == ValidationSeverity::Warning)
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any findings.
    fn validate(&self, config: &ProxyConfig) -> ValidationResult;
}

/// Checks every section of the proxy configuration.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &ProxyConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if config.server.port == 0 {
            result.add(ValidationError::error(
                "server.port",
                "server.port must not be 0",
            ));
        }
        if let Err(e) = config.server.validate() {
            result.add(ValidationError::error("server", e.to_string()));
        }
        if let Err(e) = config.upstream.validate() {
            result.add(ValidationError::error("upstream", e.to_string()));
        }
        if let Err(e) = config.rate_limits.validate() {
            result.add(ValidationError::error("rate_limits", e.to_string()));
        }

        if config.rate_limits.hosts.is_empty() {
            result.add(ValidationError::warning(
                "rate_limits.hosts",
                "no hosts configured, every request will be admitted",
            ));
        }
        for (i, limit) in config.rate_limits.hosts.iter().enumerate() {
            if limit.requests_per_window > 0.0 && limit.requests_per_window < 1.0 {
                result.add(ValidationError::warning(
                    format!("rate_limits.hosts[{i}].requests_per_window"),
                    format!(
                        "capacity below one token, every request to {} will be rejected",
                        limit.host
                    ),
                ));
            }
        }

        result
    }
}
