//! Rule declarations as they appear in the configuration file.
//!
//! These are plain data. Patterns, header names, redirect statuses and
//! inject positions are checked when `hoist-rules` builds its pipeline.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_pattern() -> String {
    "/**".to_string()
}

fn default_redirect_status() -> u16 {
    302
}

fn default_inject_position() -> String {
    "head".to_string()
}

/// Adds or removes headers on requests and responses matching `pattern`.
///
/// ```json
/// {"pattern": "/api/*", "response": {"X-Frame-Options": "DENY"}, "remove": ["Server"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRuleConfig {
    /// Path glob.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Headers appended to the request before dispatch.
    #[serde(default)]
    pub request: IndexMap<String, String>,
    /// Headers appended to the response after dispatch.
    #[serde(default)]
    pub response: IndexMap<String, String>,
    /// Response header names removed after dispatch.
    #[serde(default)]
    pub remove: Vec<String>,
}

/// Redirects requests matching `pattern` to `location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRuleConfig {
    /// Path glob; `:name` segments and `*`/`**` captures feed the location.
    pub pattern: String,
    /// Destination template.
    pub location: String,
    /// Redirect status.
    #[serde(default = "default_redirect_status")]
    pub status: u16,
}

/// Injects a snippet into HTML responses matching `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectRuleConfig {
    /// Path glob.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// `head`, `body-start` or `body-end`.
    #[serde(default = "default_inject_position")]
    pub position: String,
    /// Inline snippet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// File holding the snippet. Read at load time, relative to the
    /// configuration file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl InjectRuleConfig {
    /// The snippet, once the loader has resolved any `file` reference.
    pub fn content(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}
