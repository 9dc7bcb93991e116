//! Rule construction errors.

use hoist_core::HoistError;
use thiserror::Error;

/// A rule in the configuration cannot be turned into a pipeline stage.
///
/// These are reported once, when the pipeline is built at cold start.
/// Evaluating an already-built pipeline never fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    /// The path glob is malformed.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A header name is not a valid HTTP token.
    #[error("invalid header name {name:?}")]
    InvalidHeaderName {
        /// The offending name.
        name: String,
    },

    /// A header value contains forbidden characters.
    #[error("invalid value for header {name:?}")]
    InvalidHeaderValue {
        /// Header the value belongs to.
        name: String,
    },

    /// A redirect status is not a 3xx code.
    #[error("invalid redirect status {status}")]
    InvalidStatus {
        /// The offending status.
        status: u16,
    },

    /// An inject position is not `head`, `body-start` or `body-end`.
    #[error("invalid inject position {position:?}")]
    InvalidPosition {
        /// The offending position.
        position: String,
    },

    /// A compression algorithm is not supported.
    #[error("unsupported compression algorithm {name:?}")]
    UnsupportedAlgorithm {
        /// The offending algorithm name.
        name: String,
    },
}

impl RuleError {
    /// Create an invalid pattern error.
    pub fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

impl From<RuleError> for HoistError {
    fn from(err: RuleError) -> Self {
        Self::rule(err.to_string())
    }
}
