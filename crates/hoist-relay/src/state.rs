//! Process state.

use std::fmt;

/// Lifecycle of the application process.
///
/// ```text
/// Stopped -> Starting -> Ready -> Crashed -> Starting ...
///                 \                  \
///                  -> Crashed         -> Stopping (restart budget exhausted)
/// ```
///
/// `Stopping` is terminal: it is entered on shutdown or when the restart
/// budget runs out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// No process has been launched yet.
    #[default]
    Stopped,
    /// A launch and readiness probe are in progress.
    Starting,
    /// The process accepts connections.
    Ready,
    /// The process died or failed to start.
    Crashed(String),
    /// The relay no longer forwards requests.
    Stopping,
}

impl ProcessState {
    /// Short label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Crashed(_) => "crashed",
            Self::Stopping => "stopping",
        }
    }

    /// Returns `true` while a start is in progress.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting)
    }

    /// Returns `true` if a new start may be attempted from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed(_))
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crashed(reason) => write!(f, "crashed ({reason})"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_start() {
        assert!(ProcessState::Stopped.can_start());
        assert!(ProcessState::Crashed("exit 1".into()).can_start());
        assert!(!ProcessState::Starting.can_start());
        assert!(!ProcessState::Ready.can_start());
        assert!(!ProcessState::Stopping.can_start());
    }

    #[test]
    fn test_display() {
        assert_eq!(ProcessState::Ready.to_string(), "ready");
        assert_eq!(
            ProcessState::Crashed("startup timeout".into()).to_string(),
            "crashed (startup timeout)"
        );
    }
}
