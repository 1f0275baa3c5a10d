//! # gatekit-core
//!
//! Shared utilities for the gatekit crates.
//!
//! `gatekit-client` and `gatekit-server` both load their configuration through
//! [`ConfigBuilder`] and report through `tracing`; this crate holds the pieces
//! they have in common.
//!
//! ## Features
//!
//! - `tracing` - Enable logging initialization with tracing-subscriber (default)

mod config;
mod environment;
mod logging;

pub use config::{ConfigBuilder, ConfigError, ConfigFormat};
pub use environment::Environment;
pub use logging::LogFormat;

#[cfg(feature = "tracing")]
pub use logging::{init_logging, init_logging_from_env};
