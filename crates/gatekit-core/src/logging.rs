//! Logging initialization.

use std::{env, str::FromStr};

/// Default filter when neither `RUST_LOG` nor `LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        })
    }
}

impl LogFormat {
    pub fn from_env() -> Self {
        env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

fn level_from_env() -> String {
    env::var("LOG_LEVEL")
        .ok()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `filter`.
///
/// Calling this more than once keeps the first subscriber.
#[cfg(feature = "tracing")]
pub fn init_logging(format: LogFormat, filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let installed = match format {
        LogFormat::Text => fmt().with_env_filter(env_filter).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_current_span(false)
            .with_env_filter(env_filter)
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(?format, filter, "logging initialized");
    }
}

/// Initialize logging from `LOG_FORMAT` and `LOG_LEVEL`.
#[cfg(feature = "tracing")]
pub fn init_logging_from_env() {
    init_logging(LogFormat::from_env(), &level_from_env());
}
