//! Layered configuration loading.
//!
//! Values are resolved in order: struct defaults, then the last structured
//! config file (`.toml`, `.yaml`, `.json`), then environment variables.

use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use crate::logging::init_logging_from_env;

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Failed to parse or deserialize configuration.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    DotEnv,
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "env" => Some(Self::DotEnv),
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn is_dotenv_name(path: &Path) -> bool {
        let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        file_name.starts_with(".env") || file_name == "env"
    }
}

/// Configuration builder.
///
/// # Example
///
/// ```ignore
/// use gatekit_core::ConfigBuilder;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyConfig {
///     grpc_port: u16,
/// }
///
/// // APP_GRPC_PORT=50052 overrides the file value
/// let config: MyConfig = ConfigBuilder::new()
///     .with_dotenv()
///     .with_env_prefix("APP")
///     .with_config_file("config.toml")
///     .build()?;
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    load_default_dotenv: bool,
    config_files: Vec<PathBuf>,
    env_prefix: Option<String>,
    #[cfg(feature = "tracing")]
    init_logging: bool,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load environment variables from `.env` file in current directory.
    pub fn with_dotenv(mut self) -> Self {
        self.load_default_dotenv = true;
        self
    }

    /// Load a configuration file.
    ///
    /// File format is detected from extension:
    /// - `.env` - Environment variables (multiple allowed)
    /// - `.toml` / `.yaml` / `.json` - Config file (last one used)
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    /// Only read environment variables starting with `{prefix}_`.
    ///
    /// The prefix is stripped before matching field names, so with prefix
    /// `APP` the variable `APP_GRPC_PORT` sets `grpc_port`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Initialize logging from environment variables (`LOG_FORMAT`, `LOG_LEVEL`, `RUST_LOG`).
    #[cfg(feature = "tracing")]
    pub fn with_logging_from_env(mut self) -> Self {
        self.init_logging = true;
        self
    }

    /// Build and return the configuration.
    pub fn build<C: DeserializeOwned>(self) -> Result<C, ConfigError> {
        if self.load_default_dotenv {
            let _ = dotenvy::dotenv();
        }

        let mut main_config_file: Option<&Path> = None;

        for path in &self.config_files {
            match ConfigFormat::from_path(path) {
                Some(ConfigFormat::DotEnv) => load_dotenv_file(path),
                Some(_) => main_config_file = Some(path),
                None if ConfigFormat::is_dotenv_name(path) => load_dotenv_file(path),
                None => {
                    tracing::warn!(path = %path.display(), "ignoring config file with unknown format")
                }
            }
        }

        #[cfg(feature = "tracing")]
        if self.init_logging {
            init_logging_from_env();
        }

        let env_source = EnvSource {
            prefix: self.env_prefix,
        };

        let mut builder = config::Config::builder();
        if let Some(path) = main_config_file {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(env_source)
            .build()
            .and_then(|c| c.try_deserialize::<C>())
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn load_dotenv_file(path: &Path) {
    if path.exists() {
        if let Err(err) = dotenvy::from_path(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to load dotenv file");
        }
    }
}

/// Environment source that also maps ENVIRONMENT/APP_ENV/RUST_ENV to the `environment` field.
#[derive(Debug, Clone)]
struct EnvSource {
    prefix: Option<String>,
}

impl config::Source for EnvSource {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        use config::{Environment, Value, ValueKind};

        let source = match &self.prefix {
            Some(prefix) => Environment::with_prefix(prefix).prefix_separator("_"),
            None => Environment::default(),
        };

        let mut map = source.separator("__").try_parsing(true).collect()?;

        if !map.contains_key("environment") {
            if let Ok(val) = env::var("ENVIRONMENT")
                .or_else(|_| env::var("APP_ENV"))
                .or_else(|_| env::var("RUST_ENV"))
            {
                map.insert(
                    "environment".to_string(),
                    Value::new(None, ValueKind::String(val)),
                );
            }
        }

        Ok(map)
    }
}
