//! Typed configuration for Hoist.
//!
//! A [`Config`] describes one deployed project: whether invocations go to an
//! application process or to static files, how that process is supervised,
//! and the ordered rule declarations the pipeline is built from.
//!
//! Loading is layered: defaults, then a JSON or TOML file, then `HOIST_*`
//! environment overrides. Inject rules that reference a `file` are read
//! during loading, and the result is validated before it is handed out.
//!
//! # Example
//!
//! ```
//! use hoist_config::{ConfigLoader, ProjectType};
//!
//! let config = ConfigLoader::new()
//!     .with_string(r#"{"type": "static", "static": {"dir": "public"}}"#, "json")
//!     .unwrap()
//!     .load()
//!     .unwrap();
//!
//! assert_eq!(config.project_type, ProjectType::Static);
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `HOIST_PROJECT_TYPE` - `server` or `static`
//! - `HOIST_COMMAND` - application start command
//! - `HOIST_WORKING_DIR` - application working directory
//! - `HOIST_STATIC_ROOT` - static document root
//! - `HOIST_STARTUP_TIMEOUT`, `HOIST_REQUEST_TIMEOUT` - durations
//! - `HOIST_LOG_LEVEL` - default log filter

#![doc(html_root_url = "https://docs.rs/hoist-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
pub mod duration;
mod error;
mod loader;
mod rules;

pub use config::{
    CompressionSettings, Config, CorsSettings, ErrorPageVariables, ErrorPagesSettings,
    LoggingSettings, ProjectType, RelaySettings, RestartPolicy, StaticSettings,
};
pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use rules::{HeaderRuleConfig, InjectRuleConfig, RedirectRuleConfig};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "hoist.json";
