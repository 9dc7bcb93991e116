//! Configuration error types.

use std::path::PathBuf;

use hoist_core::HoistError;
use thiserror::Error;

/// Errors that can occur while loading or validating a [`Config`](crate::Config).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read a file referenced by the configuration.
    #[error("failed to read {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File extension is neither `.json` nor `.toml`.
    #[error("unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The offending extension or format name.
        format: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// Missing required field.
    #[error("missing required configuration field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Create a new invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for HoistError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/srv/hoist.json");
        assert!(err.to_string().contains("/srv/hoist.json"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("proxy.request_timeout", "must be positive");
        assert!(err.to_string().contains("proxy.request_timeout"));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("HOIST_PROJECT_TYPE", "expected server or static");
        assert!(err.to_string().contains("HOIST_PROJECT_TYPE"));
    }

    #[test]
    fn test_converts_to_hoist_error() {
        let err: HoistError = ConfigError::missing_field("proxy.command").into();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("proxy.command"));
    }
}
