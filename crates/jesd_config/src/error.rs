//! Error types for configuration loading and validation.

/// Errors that can occur when loading, validating, or resolving a `link.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A required field is missing from the configuration.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A frequency or duration could not be interpreted or is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// The dotted path of the offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}
