//! Error types for server startup and serving.

use std::io;
use std::net::SocketAddr;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`Server::start`](crate::Server::start).
///
/// Startup failures are returned directly. Once both serve loops are running
/// the first loop failure is returned after the server has stopped.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server was already started")]
    AlreadyStarted,

    #[error("invalid address `{host}`: {source}")]
    InvalidAddress {
        host: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("adapter `{adapter}` failed to attach to the gateway: {source}")]
    Gateway {
        adapter: String,
        #[source]
        source: BoxError,
    },

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("HTTP server error: {0}")]
    Http(#[source] io::Error),
}

/// Failure to set up the Prometheus recorder.
#[derive(Debug, thiserror::Error)]
#[error("failed to register metrics: {0}")]
pub struct MetricsError(#[from] pub(crate) metrics_exporter_prometheus::BuildError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_the_listener() {
        let err = ServerError::Bind {
            listener: "gRPC",
            addr: "127.0.0.1:50051".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        let message = err.to_string();
        assert!(message.starts_with("failed to bind gRPC listener on 127.0.0.1:50051"));
    }

    #[test]
    fn gateway_error_names_the_adapter() {
        let err = ServerError::Gateway {
            adapter: "users".to_string(),
            source: "route conflict".into(),
        };
        assert_eq!(
            err.to_string(),
            "adapter `users` failed to attach to the gateway: route conflict"
        );
    }

    #[test]
    fn already_started_display() {
        assert_eq!(
            ServerError::AlreadyStarted.to_string(),
            "server was already started"
        );
    }
}
