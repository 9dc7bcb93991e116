//! Structured logging for the runtime binary.
//!
//! JSON lines by default, one object per event, with the fields of the
//! enclosing spans attached. The filter comes from `LOG_LEVEL` when set,
//! else from the configuration.
//!
//! ```rust,ignore
//! use hoist_runtime::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from_env(&config.logging))?;
//! tracing::info!(request_id = "abc", status = 200, "invocation complete");
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use hoist_config::LoggingSettings;

use crate::error::RuntimeError;

/// Environment variable that overrides the configured filter.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive (e.g. `info`, `hoist_relay=debug,warn`).
    pub level: String,

    /// JSON output (`true`) or human-readable output.
    pub json_format: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Builds the configuration from settings, letting `LOG_LEVEL` win.
    pub fn from_env(settings: &LoggingSettings) -> Self {
        Self::resolve(settings, std::env::var(LOG_LEVEL_ENV).ok())
    }

    fn resolve(settings: &LoggingSettings, env_level: Option<String>) -> Self {
        let level = env_level
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| settings.level.clone());
        Self {
            level,
            json_format: settings.json,
            ..Self::default()
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`RuntimeError::LoggingInit`] for an invalid filter or when a
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), RuntimeError> {
    let filter = create_env_filter(&config.level)?;

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| RuntimeError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| RuntimeError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

/// Parses a filter directive.
pub fn create_env_filter(filter: &str) -> Result<EnvFilter, RuntimeError> {
    EnvFilter::try_new(filter)
        .map_err(|e| RuntimeError::LoggingInit(format!("invalid log level {filter:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.json_format);
    }

    #[test]
    fn test_env_level_wins() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            json: false,
        };
        let config = LogConfig::resolve(&settings, Some("debug".to_string()));
        assert_eq!(config.level, "debug");
        assert!(!config.json_format);

        assert_eq!(LogConfig::resolve(&settings, None).level, "warn");
        assert_eq!(LogConfig::resolve(&settings, Some(" ".to_string())).level, "warn");
    }

    #[test]
    fn test_env_filter_validation() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("hoist_relay=debug,warn").is_ok());
        assert!(matches!(
            create_env_filter("hoist=notalevel"),
            Err(RuntimeError::LoggingInit(_))
        ));
    }
}
