//! Layered configuration loading.
//!
//! Defaults, then a file, then `HOIST_*` environment overrides, then
//! inject-file resolution and validation.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::duration::parse_duration;
use crate::error::ConfigError;

/// Prefix shared by every recognised environment override.
pub const ENV_PREFIX: &str = "HOIST_";

/// Configuration loader.
///
/// # Example
///
/// ```no_run
/// use hoist_config::ConfigLoader;
///
/// # fn main() -> Result<(), hoist_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("hoist.json")?
///     .with_env()
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: Config,
    base_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ConfigLoader {
    /// Create a loader starting from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration with the contents of `path`.
    ///
    /// The format follows the extension (`.json` or `.toml`). Relative
    /// inject files are later resolved against the file's directory.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        self.config = parse(&content, &format)?;
        self.base_dir = path.parent().map(Path::to_path_buf);
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file keeps the
    /// defaults.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            tracing::debug!(path = %path.as_ref().display(), "no configuration file, using defaults");
            Ok(self)
        }
    }

    /// Replace the configuration with `content` in the given format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Directory that relative inject files are resolved against.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Capture `HOIST_*` overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_vars(std::env::vars())
    }

    /// Use the given variables as environment overrides.
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        self
    }

    /// Apply overrides, resolve inject files and validate.
    pub fn load(mut self) -> Result<Config, ConfigError> {
        let env = std::mem::take(&mut self.env);
        for (key, value) in &env {
            apply_env_var(&mut self.config, key, value)?;
        }

        resolve_inject_files(&mut self.config, self.base_dir.as_deref())?;
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse(content: &str, format: &str) -> Result<Config, ConfigError> {
    match format {
        "json" => Ok(serde_json::from_str(content)?),
        "toml" => Ok(toml::from_str(content)?),
        other => Err(ConfigError::unsupported_format(other)),
    }
}

fn apply_env_var(config: &mut Config, key: &str, value: &str) -> Result<(), ConfigError> {
    match key.strip_prefix(ENV_PREFIX).unwrap_or(key) {
        "PROJECT_TYPE" => {
            config.project_type = value
                .parse()
                .map_err(|_| ConfigError::env_parse_error(key, "expected server or static"))?;
        }
        "COMMAND" => config.proxy.command = value.to_string(),
        "WORKING_DIR" => config.proxy.working_dir = PathBuf::from(value),
        "STATIC_ROOT" => config.static_files.dir = PathBuf::from(value),
        "LOG_LEVEL" => config.logging.level = value.to_string(),
        "STARTUP_TIMEOUT" => {
            config.proxy.startup_timeout =
                parse_duration(value).map_err(|e| ConfigError::env_parse_error(key, e))?;
        }
        "REQUEST_TIMEOUT" => {
            config.proxy.request_timeout =
                parse_duration(value).map_err(|e| ConfigError::env_parse_error(key, e))?;
        }
        // HOIST_STAGE, HOIST_COMMIT and friends are runtime metadata.
        _ => {}
    }
    Ok(())
}

fn resolve_inject_files(config: &mut Config, base_dir: Option<&Path>) -> Result<(), ConfigError> {
    for rule in &mut config.inject {
        let Some(file) = rule.file.take() else {
            continue;
        };
        if rule.value.is_some() {
            return Err(ConfigError::invalid_value(
                "inject",
                "set either value or file, not both",
            ));
        }

        let path = match base_dir {
            Some(dir) if file.is_relative() => dir.join(&file),
            _ => file,
        };
        let content =
            std::fs::read_to_string(&path).map_err(|e| ConfigError::read_error(&path, e))?;
        rule.value = Some(content);
    }
    Ok(())
}
