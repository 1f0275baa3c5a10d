//! Metrics layer for gRPC requests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use metrics::SharedString;
use tower::{Layer, Service};

use crate::metrics::MetricsRegistry;

/// Counts every call and times it into the server's [`MetricsRegistry`].
///
/// Records, labelled by `service` and full `method` path:
/// - `grpc_requests_total` on entry
/// - `grpc_request_duration_seconds` when the call finishes, panics or is
///   dropped
///
/// Responses and errors pass through untouched.
#[derive(Clone)]
pub struct MetricsLayer {
    registry: MetricsRegistry,
    service: SharedString,
}

impl MetricsLayer {
    pub fn new(registry: MetricsRegistry, service: impl Into<Arc<str>>) -> Self {
        let service: Arc<str> = service.into();
        Self {
            registry,
            service: SharedString::from(service),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            registry: self.registry.clone(),
            service: self.service.clone(),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    registry: MetricsRegistry,
    service: SharedString,
}

/// Observes the elapsed time when dropped, including during unwinding.
struct Observation {
    registry: MetricsRegistry,
    service: SharedString,
    method: SharedString,
    start: Instant,
}

impl Drop for Observation {
    fn drop(&mut self) {
        self.registry
            .record_duration(&self.service, &self.method, self.start.elapsed());
    }
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for MetricsService<S>
where
    S: Service<http::Request<ReqBody>> + Clone + Send + 'static,
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
        let method = SharedString::from(Arc::<str>::from(req.uri().path()));
        self.registry.record_request(&self.service, &method);

        let observation = Observation {
            registry: self.registry.clone(),
            service: self.service.clone(),
            method,
            start: Instant::now(),
        };

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let _observation = observation;
            inner.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request as HttpRequest;
    use std::convert::Infallible;
    use tower::ServiceExt;

    const METHOD: &str = "/message_service.users.v1.UsersService/GetStatusInfo";

    #[derive(Clone)]
    struct MockService {
        panics: bool,
    }

    impl<B: Send + 'static> Service<HttpRequest<B>> for MockService {
        type Response = http::Response<String>;
        type Error = Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: HttpRequest<B>) -> Self::Future {
            let panics = self.panics;
            Box::pin(async move {
                tokio::task::yield_now().await;
                if panics {
                    panic!("handler blew up");
                }
                Ok(http::Response::builder()
                    .header("grpc-status", "5")
                    .body("not found".to_string())
                    .unwrap())
            })
        }
    }

    fn request() -> HttpRequest<()> {
        HttpRequest::builder().uri(METHOD).body(()).unwrap()
    }

    fn count(registry: &MetricsRegistry, name: &str) -> Option<String> {
        registry
            .render()
            .lines()
            .filter(|line| line.starts_with(name))
            .find(|line| line.contains(r#"service="users""#) && line.contains(METHOD))
            .and_then(|line| line.rsplit(' ').next())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn forwards_response_unchanged() {
        let registry = MetricsRegistry::register().unwrap();
        let service = MetricsLayer::new(registry.clone(), "users").layer(MockService { panics: false });

        let response = service.oneshot(request()).await.unwrap();

        assert_eq!(response.headers().get("grpc-status").unwrap(), "5");
        assert_eq!(response.into_body(), "not found");
        assert_eq!(count(&registry, "grpc_requests_total{").as_deref(), Some("1"));
        assert_eq!(
            count(&registry, "grpc_request_duration_seconds_count{").as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn records_duration_when_handler_panics() {
        let registry = MetricsRegistry::register().unwrap();
        let service = MetricsLayer::new(registry.clone(), "users").layer(MockService { panics: true });

        let joined = tokio::spawn(service.oneshot(request())).await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(count(&registry, "grpc_requests_total{").as_deref(), Some("1"));
        assert_eq!(
            count(&registry, "grpc_request_duration_seconds_count{").as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn records_duration_when_call_is_dropped() {
        let registry = MetricsRegistry::register().unwrap();
        let mut service = MetricsLayer::new(registry.clone(), "users").layer(MockService { panics: false });

        let pending = service.call(request());
        drop(pending);

        assert_eq!(count(&registry, "grpc_requests_total{").as_deref(), Some("1"));
        assert_eq!(
            count(&registry, "grpc_request_duration_seconds_count{").as_deref(),
            Some("1")
        );
    }

    #[test]
    fn layer_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<MetricsLayer>();
    }
}
