//! Invocation source metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation identifier for a single invocation.
///
/// The platform usually supplies one in the event's request context. When it
/// does not, a time-ordered UUID v7 is generated so log lines still sort by
/// arrival.
///
/// # Example
///
/// ```
/// use hoist_core::RequestId;
///
/// let supplied = RequestId::from("c6af9ac6-7b61-11e6-9a41-93e8deadbeef");
/// assert_eq!(supplied.as_str(), "c6af9ac6-7b61-11e6-9a41-93e8deadbeef");
///
/// let generated = RequestId::generate();
/// assert!(!generated.as_str().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh UUID v7 request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where an invocation came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceContext {
    /// Deployment stage name (e.g. `production`).
    pub stage: Option<String>,
    /// Request id used for log and error correlation.
    pub request_id: RequestId,
    /// IP address of the original client.
    pub client_ip: Option<String>,
}

impl SourceContext {
    /// Creates a context with a generated request id and no stage or client IP.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::from("req-123");
        assert_eq!(id.to_string(), "req-123");
    }

    #[test]
    fn test_request_id_serde_transparent() {
        let id = RequestId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc""#);
    }
}
