//! Module configuration handle.

/// Configuration passed to [`super::ModuleContract::init`] and
/// [`super::ModuleContract::reload`].
///
/// Modules receive their own section of the process configuration as raw
/// TOML and deserialize it into their typed config. An empty handle tells the
/// module to keep the configuration it was constructed with.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    raw: Option<String>,
}

impl ModuleConfig {
    /// Creates an empty configuration handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration handle from a raw TOML section.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
        }
    }

    /// Serializes a typed section into a configuration handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as TOML.
    pub fn from_section<T: serde::Serialize>(section: &T) -> Result<Self, toml::ser::Error> {
        toml::to_string(section).map(Self::from_raw)
    }

    /// Gets the raw configuration string.
    #[must_use]
    pub fn raw_config(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Parses the raw section into `T`, if one was provided.
    ///
    /// # Errors
    ///
    /// Returns the TOML parse error when the section is malformed.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<Option<T>, toml::de::Error> {
        self.raw.as_deref().map(toml::from_str).transpose()
    }
}
