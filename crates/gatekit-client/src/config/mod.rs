//! Configuration types for the invocation client.

mod client;

pub use client::{ClientConfig, ClientConfigBuilder};

pub use gatekit_core::{ConfigBuilder, ConfigError, Environment};
