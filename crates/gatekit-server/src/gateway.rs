//! HTTP/JSON gateway: adapter routes over an internal gRPC connection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde::Serialize;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

use crate::adapter::ServiceAdapter;
use crate::error::ServerError;

/// JSON error body returned by the gateway.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// HTTP status and error code for a gRPC code, per the standard gateway table.
pub fn http_mapping(code: Code) -> (StatusCode, &'static str) {
    match code {
        Code::Ok => (StatusCode::OK, "OK"),
        // nginx "client closed request"
        Code::Cancelled => (
            StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            "CANCELLED",
        ),
        Code::Unknown => (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN"),
        Code::InvalidArgument => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
        Code::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED"),
        Code::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Code::AlreadyExists => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
        Code::PermissionDenied => (StatusCode::FORBIDDEN, "PERMISSION_DENIED"),
        Code::ResourceExhausted => (StatusCode::TOO_MANY_REQUESTS, "RESOURCE_EXHAUSTED"),
        Code::FailedPrecondition => (StatusCode::BAD_REQUEST, "FAILED_PRECONDITION"),
        Code::Aborted => (StatusCode::CONFLICT, "ABORTED"),
        Code::OutOfRange => (StatusCode::BAD_REQUEST, "OUT_OF_RANGE"),
        Code::Unimplemented => (StatusCode::NOT_IMPLEMENTED, "UNIMPLEMENTED"),
        Code::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        Code::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        Code::DataLoss => (StatusCode::INTERNAL_SERVER_ERROR, "DATA_LOSS"),
        Code::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
    }
}

/// A failed RPC surfaced as an HTTP response.
///
/// Return it from gateway handlers; `?` on a `Result<_, Status>` converts.
#[derive(Debug)]
pub struct GatewayError(pub Status);

impl From<Status> for GatewayError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = http_mapping(self.0.code());
        let body = ErrorResponse::new(code, self.0.message());
        (status, axum::Json(body)).into_response()
    }
}

/// JSON 404 for unmatched routes.
pub async fn fallback_handler() -> Response {
    let body = ErrorResponse::new("NOT_FOUND", "The requested resource was not found");
    (StatusCode::NOT_FOUND, axum::Json(body)).into_response()
}

/// Address the gateway dials to reach a listener bound on `bound`.
pub(crate) fn internal_target(bound: SocketAddr) -> SocketAddr {
    let ip = match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, bound.port())
}

/// Lazy connection to the server's own gRPC listener.
pub(crate) fn internal_channel(grpc_addr: SocketAddr) -> Result<Channel, ServerError> {
    let target = internal_target(grpc_addr);
    let endpoint = Endpoint::from_shared(format!("http://{}", target))?.tcp_nodelay(true);
    Ok(endpoint.connect_lazy())
}

/// Let every adapter add its routes, then install the JSON fallback.
pub(crate) fn gateway_router(
    adapters: &[Arc<dyn ServiceAdapter>],
    channel: Channel,
) -> Result<Router, ServerError> {
    let mut router = Router::new();
    for adapter in adapters {
        router = adapter
            .attach_to_gateway(router, channel.clone())
            .map_err(|source| ServerError::Gateway {
                adapter: adapter.name().to_string(),
                source,
            })?;
        tracing::debug!(adapter = adapter.name(), "Adapter attached to gateway");
    }
    Ok(router.fallback(fallback_handler))
}
