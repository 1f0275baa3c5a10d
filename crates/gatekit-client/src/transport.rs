//! Connection establishment and the unary call seam.

use std::future::Future;

use http::uri::PathAndQuery;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};

use crate::config::ClientConfig;
use crate::error::{BoxError, ClientError};

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum CallError {
    /// The server (or the transport on its behalf) answered with a status.
    Status(Status),
    /// The call never produced a status, e.g. the connection was not ready.
    Other(BoxError),
}

impl From<Status> for CallError {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

/// A connection able to carry unary calls.
///
/// Implementations must be safe for concurrent use: the client clones the
/// transport per attempt and many attempts may be in flight at once.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Perform one unary call on `path`.
    fn unary<Req, Resp>(
        &self,
        path: PathAndQuery,
        request: Request<Req>,
    ) -> impl Future<Output = Result<Response<Resp>, CallError>> + Send
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static;
}

impl Transport for Channel {
    async fn unary<Req, Resp>(
        &self,
        path: PathAndQuery,
        request: Request<Req>,
    ) -> Result<Response<Resp>, CallError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.clone());
        grpc.ready()
            .await
            .map_err(|e| CallError::Other(e.into()))?;

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        grpc.unary(request, path, codec)
            .await
            .map_err(CallError::Status)
    }
}

/// Build an endpoint from configuration.
pub(crate) fn build_endpoint(config: &ClientConfig) -> Result<Endpoint, ClientError> {
    let uri = config.endpoint_uri();
    let mut endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| ClientError::InvalidEndpoint {
            endpoint: uri,
            reason: e.to_string(),
        })?
        .connect_timeout(config.connect_timeout())
        .tcp_nodelay(config.tcp_nodelay)
        .tcp_keepalive(config.tcp_keepalive());

    if let Some(interval) = config.http2_keepalive_interval() {
        endpoint = endpoint.http2_keep_alive_interval(interval);
    }

    if let Some(timeout) = config.http2_keepalive_timeout() {
        endpoint = endpoint.keep_alive_timeout(timeout);
    }

    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_accepts_bare_host_port() {
        let config = ClientConfig {
            endpoint: "localhost:50051".to_string(),
            ..Default::default()
        };
        let endpoint = build_endpoint(&config).unwrap();
        assert!(endpoint.uri().to_string().starts_with("http://localhost:50051"));
    }

    #[test]
    fn endpoint_rejects_garbage() {
        let config = ClientConfig {
            endpoint: "http://bad host:50051".to_string(),
            ..Default::default()
        };
        let err = build_endpoint(&config).unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint { .. }));
    }

    #[test]
    fn status_converts_into_call_error() {
        let err: CallError = Status::unavailable("down").into();
        assert!(matches!(err, CallError::Status(s) if s.code() == tonic::Code::Unavailable));
    }
}
