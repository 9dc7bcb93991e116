//! Relay errors.

use std::error::Error as StdError;
use std::io;

use hoist_core::HoistError;
use thiserror::Error;

/// Errors produced by the process relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The application failed to launch or never became ready.
    #[error("Startup failed: {reason}")]
    Startup {
        /// Why the start failed.
        reason: String,
    },

    /// Too many restarts inside the restart window.
    #[error("Restart budget exhausted: {reason}")]
    BudgetExhausted {
        /// The crash that could not be recovered.
        reason: String,
    },

    /// The application did not answer in time.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout {
        /// The elapsed timeout, in milliseconds.
        timeout_ms: u64,
    },

    /// The loopback connection was refused, reset or closed early.
    #[error("Upstream crashed: {reason}")]
    Crash {
        /// Transport-level reason.
        reason: String,
    },

    /// The relay is stopping.
    #[error("Relay is shutting down")]
    ShuttingDown,

    /// The HTTP client could not be built or the request was malformed.
    #[error("Client error: {0}")]
    Client(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Create a startup error.
    pub fn startup(reason: impl Into<String>) -> Self {
        Self::Startup {
            reason: reason.into(),
        }
    }

    /// Create a crash error.
    pub fn crash(reason: impl Into<String>) -> Self {
        Self::Crash {
            reason: reason.into(),
        }
    }

    /// Classifies a failed loopback exchange.
    ///
    /// Refused, reset, aborted and closed-before-response connections mean
    /// the process is gone. Anything else is a client-side problem.
    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() || is_connection_failure(err) {
            Self::crash(root_cause(err))
        } else {
            Self::Client(root_cause(err))
        }
    }
}

fn is_connection_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(hyper_err) = current.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() || hyper_err.is_closed() || hyper_err.is_canceled()
            {
                return true;
            }
        }
        source = current.source();
    }
    false
}

fn root_cause(err: &(dyn StdError + 'static)) -> String {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}

impl From<RelayError> for HoistError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Startup { reason } => Self::StartupFailure { reason },
            RelayError::BudgetExhausted { reason } => Self::RestartBudgetExhausted { reason },
            RelayError::Timeout { timeout_ms } => Self::UpstreamTimeout { timeout_ms },
            RelayError::Crash { reason } => Self::UpstreamCrash { reason },
            RelayError::ShuttingDown => Self::ShuttingDown,
            RelayError::Client(message) => Self::internal(message),
            RelayError::Io(e) => Self::internal(e.to_string()),
        }
    }
}
