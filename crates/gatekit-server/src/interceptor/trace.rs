//! One log line per inbound RPC.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tonic::{Code, Status};
use tower::{Layer, Service};
use tracing::Instrument;

use super::REQUEST_ID_HEADER;

/// Wraps each call in a `grpc` span (`service`, `method`, `request_id`) and
/// logs its outcome: `info` on success, `warn` for caller-side codes,
/// `error` for server-side ones.
#[derive(Clone)]
pub struct TraceLayer {
    service: Arc<str>,
}

impl TraceLayer {
    pub fn new(service: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService {
            inner,
            service: Arc::clone(&self.service),
        }
    }
}

#[derive(Clone)]
pub struct TraceService<S> {
    inner: S,
    service: Arc<str>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for TraceService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        let span = tracing::info_span!(
            "grpc",
            service = %self.service,
            method = %req.uri().path(),
            request_id = %request_id(req.headers()),
        );

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let call = async move {
            let start = Instant::now();
            let result = inner.call(req).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(response) => log_outcome(response_code(response.headers()), latency_ms),
                Err(_) => tracing::error!(latency_ms, "gRPC call failed before a response"),
            }
            result
        };

        Box::pin(call.instrument(span))
    }
}

fn request_id(headers: &http::HeaderMap) -> &str {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Code of a trailers-only response. Streaming responses carry it in the
/// trailers instead, which this layer never sees; those read as `Ok`.
fn response_code(headers: &http::HeaderMap) -> Code {
    headers
        .get(Status::GRPC_STATUS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok())
        .map(Code::from)
        .unwrap_or(Code::Ok)
}

fn log_outcome(code: Code, latency_ms: u64) {
    match code {
        Code::Ok => tracing::info!(code = ?code, latency_ms, "gRPC call"),
        Code::Unknown | Code::Internal | Code::Unavailable | Code::DataLoss => {
            tracing::error!(code = ?code, latency_ms, "gRPC call failed")
        }
        _ => tracing::warn!(code = ?code, latency_ms, "gRPC call failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tower::ServiceExt;

    #[derive(Clone)]
    struct Fixed(&'static str);

    impl<B> Service<http::Request<B>> for Fixed {
        type Response = http::Response<String>;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: http::Request<B>) -> Self::Future {
            let response = http::Response::builder()
                .header("grpc-status", self.0)
                .body("body".to_string())
                .unwrap();
            std::future::ready(Ok(response))
        }
    }

    fn request(request_id: Option<&str>) -> http::Request<()> {
        let mut builder =
            http::Request::builder().uri("/message_service.users.v1.UsersService/GetStatusInfo");
        if let Some(id) = request_id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        builder.body(()).unwrap()
    }

    #[tokio::test]
    async fn response_passes_through() {
        let service = TraceLayer::new("users").layer(Fixed("0"));

        let response = service.oneshot(request(Some("req-1"))).await.unwrap();

        assert_eq!(response.headers().get("grpc-status").unwrap(), "0");
        assert_eq!(response.into_body(), "body");
    }

    #[tokio::test]
    async fn failed_call_passes_through() {
        let service = TraceLayer::new("users").layer(Fixed("13"));

        let response = service.oneshot(request(None)).await.unwrap();

        assert_eq!(response.headers().get("grpc-status").unwrap(), "13");
    }

    #[test]
    fn reads_trailers_only_status() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(response_code(&headers), Code::Ok);

        headers.insert("grpc-status", "5".parse().unwrap());
        assert_eq!(response_code(&headers), Code::NotFound);

        headers.insert("grpc-status", "garbage".parse().unwrap());
        assert_eq!(response_code(&headers), Code::Ok);
    }

    #[test]
    fn missing_request_id_is_a_dash() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(request_id(&headers), "-");

        headers.insert(REQUEST_ID_HEADER, "abc".parse().unwrap());
        assert_eq!(request_id(&headers), "abc");
    }
}
