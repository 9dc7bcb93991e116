//! Runtime errors.

use thiserror::Error;

/// Errors raised while talking to the platform runtime API or setting up
/// the process.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime API endpoint variable is not set.
    #[error("{0} is not set")]
    MissingEndpoint(&'static str),

    /// The next-invocation response had no request id header.
    #[error("invocation has no {0} header")]
    MissingRequestId(&'static str),

    /// The runtime API answered with an unexpected status.
    #[error("runtime API {endpoint} returned {status}")]
    UnexpectedStatus {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status received.
        status: u16,
    },

    /// Transport failure talking to the runtime API.
    #[error("runtime API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
