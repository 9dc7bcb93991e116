//! Configuration types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rules::{HeaderRuleConfig, InjectRuleConfig, RedirectRuleConfig};

/// Top-level configuration for one deployed project.
///
/// Immutable once loaded; the runtime builds every component from it at
/// cold start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name, used in logs.
    pub name: String,
    /// Whether invocations go to an application process or to static files.
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    /// Extra environment variables passed to the application process.
    pub environment: IndexMap<String, String>,
    /// Application process settings.
    pub proxy: RelaySettings,
    /// Static file settings.
    #[serde(rename = "static")]
    pub static_files: StaticSettings,
    /// Header rules, in declared order.
    pub headers: Vec<HeaderRuleConfig>,
    /// Redirect rules, in declared order.
    pub redirects: Vec<RedirectRuleConfig>,
    /// Content injection rules, in declared order.
    pub inject: Vec<InjectRuleConfig>,
    /// CORS policy. Absent means no CORS handling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsSettings>,
    /// Error page settings.
    pub error_pages: ErrorPagesSettings,
    /// Response compression settings.
    pub compression: CompressionSettings,
    /// Log settings.
    pub logging: LoggingSettings,
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_type == ProjectType::Server && self.proxy.command.trim().is_empty() {
            return Err(ConfigError::missing_field("proxy.command"));
        }
        if self.proxy.startup_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "proxy.startup_timeout",
                "must be greater than zero",
            ));
        }
        if self.proxy.request_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "proxy.request_timeout",
                "must be greater than zero",
            ));
        }
        if self.proxy.restarts.window.is_zero() {
            return Err(ConfigError::invalid_value(
                "proxy.restarts.window",
                "must be greater than zero",
            ));
        }

        if self.static_files.index.is_empty() || self.static_files.index.contains('/') {
            return Err(ConfigError::invalid_value(
                "static.index",
                "must be a plain file name",
            ));
        }

        for (i, rule) in self.inject.iter().enumerate() {
            if rule.value.is_some() && rule.file.is_some() {
                return Err(ConfigError::invalid_value(
                    format!("inject[{i}]"),
                    "set either value or file, not both",
                ));
            }
            if rule.value.is_none() && rule.file.is_none() {
                return Err(ConfigError::missing_field(format!("inject[{i}].value")));
            }
        }

        if let Some(cors) = &self.cors {
            if cors.allow_credentials && cors.allowed_origins.iter().any(|o| o == "*") {
                tracing::warn!("cors: wildcard origin with credentials echoes the request origin");
            }
        }

        for name in &self.compression.algorithms {
            if !matches!(name.as_str(), "gzip" | "br") {
                return Err(ConfigError::invalid_value(
                    "compression.algorithms",
                    format!("unsupported algorithm {name:?}"),
                ));
            }
        }

        for status in self.error_pages.pages.keys() {
            match status.parse::<u16>() {
                Ok(code) if (400..600).contains(&code) => {}
                _ => {
                    return Err(ConfigError::invalid_value(
                        "error_pages.pages",
                        format!("{status:?} is not an error status"),
                    ))
                }
            }
        }

        Ok(())
    }
}

/// Project type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    /// Forward to a supervised application process.
    #[default]
    Server,
    /// Serve files from a directory.
    Static,
}

impl FromStr for ProjectType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "static" => Ok(Self::Static),
            other => Err(ConfigError::invalid_value(
                "type",
                format!("expected server or static, got {other:?}"),
            )),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Static => f.write_str("static"),
        }
    }
}

/// Application process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Shell command that starts the application. It must listen on `$PORT`.
    pub command: String,
    /// Working directory for the command.
    pub working_dir: PathBuf,
    /// How long the application has to accept connections after launch.
    #[serde(with = "crate::duration")]
    pub startup_timeout: Duration,
    /// Upper bound for one forwarded request.
    #[serde(with = "crate::duration")]
    pub request_timeout: Duration,
    /// Grace period for draining and for SIGTERM before the process is killed.
    #[serde(with = "crate::duration")]
    pub shutdown_timeout: Duration,
    /// Restart budget.
    pub restarts: RestartPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            command: "./server".to_string(),
            working_dir: PathBuf::from("."),
            startup_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            restarts: RestartPolicy::default(),
        }
    }
}

/// At most `max_restarts` restarts within any `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Restarts allowed inside the window.
    pub max_restarts: u32,
    /// Sliding window length.
    #[serde(with = "crate::duration")]
    pub window: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 3,
            window: Duration::from_secs(60),
        }
    }
}

/// Static file settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSettings {
    /// Document root.
    pub dir: PathBuf,
    /// Index document appended to directory paths.
    pub index: String,
    /// Document served with 200 when nothing else matches.
    pub spa_fallback: Option<String>,
    /// `Cache-Control` value for served files.
    pub cache_control: Option<String>,
    /// Extension (without dot) to content type overrides.
    pub mime_types: IndexMap<String, String>,
    /// Extra content types treated as text. Added to the built-in list.
    pub text_types: Vec<String>,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            index: "index.html".to_string(),
            spa_fallback: None,
            cache_control: None,
            mime_types: IndexMap::new(),
            text_types: Vec::new(),
        }
    }
}

/// CORS policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Exact origins, `*`, or wildcard patterns such as `https://*.example.com`.
    pub allowed_origins: Vec<String>,
    /// Methods advertised on preflight.
    pub allowed_methods: Vec<String>,
    /// Request headers advertised on preflight.
    pub allowed_headers: Vec<String>,
    /// Response headers exposed to scripts.
    pub exposed_headers: Vec<String>,
    /// Whether credentials are allowed.
    pub allow_credentials: bool,
    /// Preflight cache lifetime.
    #[serde(with = "crate::duration::option", skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age: None,
        }
    }
}

/// Error page settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPagesSettings {
    /// Leave error bodies untouched.
    pub disable: bool,
    /// Directory searched for `<status>.html`, `<class>xx.html` and `error.html`.
    pub dir: Option<PathBuf>,
    /// Inline templates keyed by status code.
    pub pages: IndexMap<String, String>,
    /// Template variables.
    pub variables: ErrorPageVariables,
}

/// Values substituted into error page templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPageVariables {
    /// Accent color.
    pub color: String,
    /// Support address shown on the page.
    pub support_email: Option<String>,
}

impl Default for ErrorPageVariables {
    fn default() -> Self {
        Self {
            color: "#228ae6".to_string(),
            support_email: None,
        }
    }
}

/// Response compression settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    /// Whether compression runs at all.
    pub enable: bool,
    /// Minimum body size in bytes.
    pub min_size: usize,
    /// Compressible content types. Empty means the built-in list.
    pub types: Vec<String>,
    /// Supported encodings in server preference order.
    pub algorithms: Vec<String>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enable: true,
            min_size: 1024,
            types: Vec::new(),
            algorithms: vec!["gzip".to_string(), "br".to_string()],
        }
    }
}

/// Log settings. `LOG_LEVEL` in the environment wins over `level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive.
    pub level: String,
    /// JSON lines (`true`) or human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project_type, ProjectType::Server);
        assert_eq!(config.proxy.command, "./server");
        assert_eq!(config.proxy.request_timeout, Duration::from_secs(30));
        assert_eq!(config.proxy.restarts.max_restarts, 3);
        assert_eq!(config.static_files.index, "index.html");
        assert!(config.cors.is_none());
        assert!(config.compression.enable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_config() {
        let json = r#"{
            "name": "shop",
            "type": "static",
            "static": {"dir": "public", "spa_fallback": "index.html"},
            "proxy": {"startup_timeout": "2s", "restarts": {"max_restarts": 2, "window": "1m"}},
            "cors": {"allowed_origins": ["https://a.com"], "max_age": "24h"},
            "error_pages": {"pages": {"404": "<h1>gone</h1>"}}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.name, "shop");
        assert_eq!(config.project_type, ProjectType::Static);
        assert_eq!(config.static_files.dir, PathBuf::from("public"));
        assert_eq!(config.static_files.spa_fallback.as_deref(), Some("index.html"));
        assert_eq!(config.proxy.startup_timeout, Duration::from_secs(2));
        assert_eq!(config.proxy.restarts.window, Duration::from_secs(60));

        let cors = config.cors.as_ref().unwrap();
        assert_eq!(cors.allowed_origins, vec!["https://a.com"]);
        assert_eq!(cors.max_age, Some(Duration::from_secs(86_400)));
        assert!(!cors.allowed_methods.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
type = "server"

[proxy]
command = "node app.js"
request_timeout = "500ms"

[[redirects]]
pattern = "/docs/**"
location = "/help/:splat"
status = 301
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.proxy.command, "node app.js");
        assert_eq!(config.proxy.request_timeout, Duration::from_millis(500));
        assert_eq!(config.redirects.len(), 1);
        assert_eq!(config.redirects[0].status, 301);
    }

    #[test]
    fn test_project_type_from_str() {
        assert_eq!("Static".parse::<ProjectType>().unwrap(), ProjectType::Static);
        assert!("lambda".parse::<ProjectType>().is_err());
        assert_eq!(ProjectType::Server.to_string(), "server");
    }

    #[test]
    fn test_validate_requires_command_for_server() {
        let mut config = Config::default();
        config.proxy.command = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));

        config.project_type = ProjectType::Static;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.proxy.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_algorithm() {
        let mut config = Config::default();
        config.compression.algorithms = vec!["zstd".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_error_page_keys() {
        let mut config = Config::default();
        config
            .error_pages
            .pages
            .insert("200".to_string(), "ok".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inject_needs_content() {
        let mut config = Config::default();
        config.inject.push(InjectRuleConfig {
            pattern: "/**".to_string(),
            position: "head".to_string(),
            value: None,
            file: None,
        });
        assert!(config.validate().is_err());
    }
}
