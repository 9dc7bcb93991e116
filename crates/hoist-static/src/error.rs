//! Static resolver errors.

use hoist_core::HoistError;
use http::StatusCode;
use thiserror::Error;

/// Errors that can occur when serving static files.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// The requested file was not found.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The path resolves outside the document root.
    #[error("Forbidden path: {0}")]
    Forbidden(String),

    /// Only GET and HEAD are served.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// I/O error while reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StaticFileError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StaticFileError> for HoistError {
    fn from(err: StaticFileError) -> Self {
        match err {
            StaticFileError::NotFound(path) => Self::StaticNotFound { path },
            StaticFileError::Forbidden(path) => Self::Forbidden { path },
            StaticFileError::MethodNotAllowed(method) => Self::MethodNotAllowed { method },
            StaticFileError::Io(e) => Self::internal(e.to_string()),
        }
    }
}
