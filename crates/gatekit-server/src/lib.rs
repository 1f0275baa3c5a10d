//! # gatekit-server
//!
//! One service, two protocols. A [`Server`] hosts tonic gRPC services and an
//! axum HTTP/JSON gateway that forwards to them over an internal connection,
//! plus a Prometheus endpoint, all started and stopped as a unit.
//!
//! Application services plug in through [`ServiceAdapter`]. Every inbound
//! RPC passes through the metrics and tracing layers and then the
//! configured interceptors, in order.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gatekit_server::{request_id_interceptor, signal_token, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     gatekit_server::init_logging_from_env();
//!
//!     let config: ServerConfig = ServerConfig::builder()
//!         .with_dotenv()
//!         .with_env_prefix("APP")
//!         .build()?;
//!
//!     Server::builder(config)
//!         .adapter(UsersAdapter::default())
//!         .interceptor(request_id_interceptor)
//!         .build()
//!         .start(signal_token())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization (default)
//! - `health` - Serve `grpc.health.v1.Health` (default)

mod adapter;
pub mod config;
mod error;
pub mod gateway;
pub mod interceptor;
pub mod metrics;
pub mod reflection;
mod server;

#[cfg(feature = "health")]
pub mod health;

pub use adapter::ServiceAdapter;
pub use config::{ConfigBuilder, ConfigError, Environment, ServerConfig};
pub use error::{BoxError, MetricsError, ServerError};
pub use gateway::{ErrorResponse, GatewayError};
pub use interceptor::{request_id_interceptor, InterceptorChain, UnaryInterceptor, REQUEST_ID_HEADER};
pub use metrics::MetricsRegistry;
pub use server::{shutdown_signal, signal_token, BoundAddrs, Server, ServerBuilder, ServerState};

#[cfg(feature = "health")]
pub use health::{HealthReporter, ServingStatus};

pub use tokio_util::sync::CancellationToken;
pub use tonic::{Code, Request, Response, Status};

pub use gatekit_core::LogFormat;

#[cfg(feature = "tracing")]
pub use gatekit_core::{init_logging, init_logging_from_env};
