//! Server configuration.

use serde::{Deserialize, Serialize};
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;

pub use gatekit_core::{ConfigBuilder, Environment};

/// Configuration for a dual-protocol [`Server`](crate::Server).
///
/// The three listeners share one host. A port of `0` binds an ephemeral
/// port; the actual addresses are reported by
/// [`Server::local_addrs`](crate::Server::local_addrs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub environment: Environment,
    /// Value of the `service` label on every metric.
    #[serde(alias = "name")]
    pub service_name: String,
    pub version: String,
    pub host: String,
    pub grpc_port: u16,
    #[serde(alias = "gw_port")]
    pub gateway_port: u16,
    #[serde(alias = "prometheus_port")]
    pub metrics_port: u16,
    pub metrics_path: String,
    /// How long `start` waits for in-flight calls before aborting the serve loops.
    pub graceful_shutdown_timeout_secs: u64,
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            service_name: "gatekit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            host: "0.0.0.0".to_string(),
            grpc_port: 50051,
            gateway_port: 8080,
            metrics_port: 9090,
            metrics_path: "/metrics".to_string(),
            graceful_shutdown_timeout_secs: 30,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```ignore
    /// // APP_GRPC_PORT, APP_GW_PORT and APP_PROMETHEUS_PORT override the file
    /// let config: ServerConfig = ServerConfig::builder()
    ///     .with_dotenv()
    ///     .with_env_prefix("APP")
    ///     .with_config_file("server.toml")
    ///     .build()?;
    /// ```
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Host as an IP address; IPv6 hosts may be bracketed (`[::1]`).
    pub fn ip(&self) -> Result<IpAddr, AddrParseError> {
        self.host
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
    }

    pub fn grpc_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.ip()?, self.grpc_port))
    }

    pub fn gateway_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.ip()?, self.gateway_port))
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.ip()?, self.metrics_port))
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }

    /// Metrics path with a leading `/`.
    pub fn metrics_route(&self) -> String {
        if self.metrics_path.starts_with('/') {
            self.metrics_path.clone()
        } else {
            format!("/{}", self.metrics_path)
        }
    }

    /// Same host, every port ephemeral. Handy for tests.
    pub fn ephemeral(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            grpc_port: 0,
            gateway_port: 0,
            metrics_port: 0,
            ..Default::default()
        }
    }
}

impl AsRef<ServerConfig> for ServerConfig {
    fn as_ref(&self) -> &ServerConfig {
        self
    }
}
