//! # gatekit-client
//!
//! Resilient unary gRPC invocation over one long-lived tonic channel.
//!
//! A [`Client`] owns the connection together with the call defaults
//! (timeout, retry budget, default metadata). Each logical call is a
//! [`Request`] that borrows the client, so the connection always outlives the
//! calls made on it.
//!
//! ## Retry policy
//!
//! A call is attempted at most `max_retries + 1` times. Only
//! `Unavailable`, `DeadlineExceeded` and `ResourceExhausted` are retried,
//! after sleeping `min(2^n s, 30 s)` for the n-th retry (n from 0). Any
//! other status, or a failure that carries no status at all, ends the call
//! immediately. The whole call, retries included, is bounded by the client
//! timeout.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gatekit_client::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .endpoint("localhost:50051")
//!         .max_retries(3)
//!         .metadata("x-caller", "billing")
//!         .build()?;
//!
//!     let client = Client::connect(config).await?;
//!
//!     let reply: StatusReply = client
//!         .request("users.v1.UsersService/GetStatusInfo", StatusRequest { input: 3 }, StatusReply::default())
//!         .send()
//!         .await?;
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization (default)

pub mod backoff;
mod client;
pub mod config;
mod error;
mod request;
mod transport;

pub use backoff::{backoff, is_retryable, BackoffPolicy};
pub use client::{Client, HandlerFuture, MethodHandler};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigBuilder, ConfigError};
pub use error::{BoxError, ClientError, InvokeError};
pub use request::Request;
pub use transport::{CallError, Transport};

pub use tokio_util::sync::CancellationToken;
pub use tonic::metadata::MetadataMap;
pub use tonic::{Code, Status};

pub use gatekit_core::LogFormat;

#[cfg(feature = "tracing")]
pub use gatekit_core::{init_logging, init_logging_from_env};
