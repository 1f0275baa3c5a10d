//! Invocation client configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use gatekit_core::{ConfigBuilder, ConfigError};

/// Configuration for an invocation [`Client`](crate::Client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target address. A bare `host:port` is treated as `http://host:port`.
    pub endpoint: String,
    /// Deadline for one logical call, retries and backoff included, in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Enable TCP nodelay.
    pub tcp_nodelay: bool,
    /// TCP keepalive interval in seconds.
    pub tcp_keepalive_secs: Option<u64>,
    /// HTTP/2 keep-alive interval in seconds.
    pub http2_keepalive_interval_secs: Option<u64>,
    /// HTTP/2 keep-alive timeout in seconds.
    pub http2_keepalive_timeout_secs: Option<u64>,
    /// Metadata attached to every request that does not override it.
    pub metadata: BTreeMap<String, String>,
    /// Randomize backoff delays between zero and the exponential value.
    pub backoff_jitter: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://[::1]:50051".to_string(),
            timeout_secs: 5,
            max_retries: 1,
            connect_timeout_secs: 10,
            tcp_nodelay: true,
            tcp_keepalive_secs: Some(60),
            http2_keepalive_interval_secs: Some(30),
            http2_keepalive_timeout_secs: Some(20),
            metadata: BTreeMap::new(),
            backoff_jitter: false,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = ClientConfig::builder()
    ///     .with_dotenv()
    ///     .endpoint("localhost:50051")
    ///     .timeout_secs(10)
    ///     .build()?;
    /// ```
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Endpoint URI with a scheme.
    pub fn endpoint_uri(&self) -> String {
        let endpoint = self.endpoint.trim();
        if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn tcp_keepalive(&self) -> Option<Duration> {
        self.tcp_keepalive_secs.map(Duration::from_secs)
    }

    pub fn http2_keepalive_interval(&self) -> Option<Duration> {
        self.http2_keepalive_interval_secs.map(Duration::from_secs)
    }

    pub fn http2_keepalive_timeout(&self) -> Option<Duration> {
        self.http2_keepalive_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`ClientConfig`]; explicit setters win over files and environment.
#[derive(Default)]
pub struct ClientConfigBuilder {
    inner: ConfigBuilder,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    metadata: Vec<(String, String)>,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load environment variables from `.env` file.
    pub fn with_dotenv(mut self) -> Self {
        self.inner = self.inner.with_dotenv();
        self
    }

    /// Load a configuration file.
    pub fn with_config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.with_config_file(path);
        self
    }

    /// Only read environment variables with this prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inner = self.inner.with_env_prefix(prefix);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Add a default metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let mut config: ClientConfig = self.inner.build()?;

        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        config.metadata.extend(self.metadata);

        Ok(config)
    }
}
