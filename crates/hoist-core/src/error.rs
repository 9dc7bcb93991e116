//! Error taxonomy for the relay.
//!
//! Every failure that can end an invocation maps to a [`HoistError`]
//! variant, and every variant maps to an HTTP status. Nothing raw ever
//! crosses the invocation boundary: the dispatcher turns errors into
//! responses with [`HoistError::into_response`].

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::RequestId;
use crate::message::Response;

/// Header set on 503 responses caused by an upstream timeout.
pub const TIMEOUT_HEADER: &str = "x-hoist-timeout";

/// Result type for relay operations.
pub type HoistResult<T> = Result<T, HoistError>;

/// Errors produced while handling an invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HoistError {
    /// The invocation event could not be decoded.
    #[error("Malformed invocation event: {message}")]
    Decode {
        /// What was wrong with the event.
        message: String,
    },

    /// The application process failed to launch or become ready.
    #[error("Application failed to start: {reason}")]
    StartupFailure {
        /// Why startup failed.
        reason: String,
    },

    /// The restart budget is exhausted; the instance will not restart again.
    #[error("Application restart budget exhausted: {reason}")]
    RestartBudgetExhausted {
        /// The crash that exhausted the budget.
        reason: String,
    },

    /// The application did not answer within the request timeout.
    #[error("Upstream timed out after {timeout_ms}ms")]
    UpstreamTimeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The connection to the application was refused or reset.
    #[error("Upstream crashed: {reason}")]
    UpstreamCrash {
        /// Transport-level reason.
        reason: String,
    },

    /// No static file matched the request path.
    #[error("Not found: {path}")]
    StaticNotFound {
        /// The requested path.
        path: String,
    },

    /// The request tried to reach outside the document root.
    #[error("Forbidden: {path}")]
    Forbidden {
        /// The requested path.
        path: String,
    },

    /// Static files only answer GET and HEAD.
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// The rejected method.
        method: String,
    },

    /// The instance is shutting down and accepts no new forwards.
    #[error("Relay is shutting down")]
    ShuttingDown,

    /// A rule in the configuration is malformed.
    #[error("Invalid rule: {message}")]
    RuleEvaluation {
        /// What is wrong with the rule.
        message: String,
    },

    /// The configuration is unreadable or invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl HoistError {
    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a startup failure.
    pub fn startup(reason: impl Into<String>) -> Self {
        Self::StartupFailure {
            reason: reason.into(),
        }
    }

    /// Create an upstream crash error.
    pub fn crash(reason: impl Into<String>) -> Self {
        Self::UpstreamCrash {
            reason: reason.into(),
        }
    }

    /// Create a static not-found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::StaticNotFound { path: path.into() }
    }

    /// Create a rule evaluation error.
    pub fn rule(message: impl Into<String>) -> Self {
        Self::RuleEvaluation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode { .. } => StatusCode::BAD_REQUEST,
            Self::StartupFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::RestartBudgetExhausted { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamCrash { .. } => StatusCode::BAD_GATEWAY,
            Self::StaticNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::RuleEvaluation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for logs, metrics and error bodies.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "decode",
            Self::StartupFailure { .. } => "startup_failure",
            Self::RestartBudgetExhausted { .. } => "restart_budget_exhausted",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::UpstreamCrash { .. } => "upstream_crash",
            Self::StaticNotFound { .. } => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::ShuttingDown => "shutting_down",
            Self::RuleEvaluation { .. } => "rule_evaluation",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }

    /// Check whether the relay may start the application again after this
    /// error.
    pub fn is_restartable(&self) -> bool {
        matches!(self, Self::StartupFailure { .. } | Self::UpstreamCrash { .. })
    }

    /// Converts the error into a JSON error response.
    ///
    /// Timeouts carry the [`TIMEOUT_HEADER`] indicator.
    pub fn into_response(self, request_id: &RequestId) -> Response {
        let status = self.status_code();
        let timed_out = matches!(self, Self::UpstreamTimeout { .. });
        let body = ErrorResponse::from(self).with_request_id(request_id.as_str());

        let response = Response::json(status, &body);
        if timed_out {
            response.with_header(TIMEOUT_HEADER, "1")
        } else {
            response
        }
    }
}

/// Structured error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<HoistError> for ErrorResponse {
    fn from(err: HoistError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}
