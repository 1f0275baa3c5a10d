//! Configuration types for the dual-protocol server.

mod server;

pub use server::ServerConfig;

pub use gatekit_core::{ConfigBuilder, ConfigError, Environment};
