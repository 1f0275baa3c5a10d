//! Per-server Prometheus registry and exposition endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::{counter, describe_counter, describe_histogram, histogram, SharedString, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::error::MetricsError;

pub const REQUESTS_TOTAL: &str = "grpc_requests_total";
pub const REQUEST_DURATION: &str = "grpc_request_duration_seconds";

/// Histogram buckets for request durations, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Request metrics owned by one server.
///
/// The recorder is never installed globally, so several servers (or test
/// cases) in one process keep separate series.
#[derive(Clone)]
pub struct MetricsRegistry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Build the recorder and describe the request metrics.
    pub fn register() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), &DEFAULT_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe_counter!(REQUESTS_TOTAL, "Total number of gRPC requests");
            describe_histogram!(
                REQUEST_DURATION,
                Unit::Seconds,
                "Duration of gRPC request handling in seconds"
            );
        });

        Ok(Self {
            recorder: Arc::new(recorder),
            handle,
        })
    }

    /// Label values are shared, so recording clones a pointer, not the text.
    pub(crate) fn record_request(&self, service: &SharedString, method: &SharedString) {
        metrics::with_local_recorder(&*self.recorder, || {
            counter!(REQUESTS_TOTAL, "service" => service.clone(), "method" => method.clone())
                .increment(1);
        });
    }

    pub(crate) fn record_duration(
        &self,
        service: &SharedString,
        method: &SharedString,
        elapsed: Duration,
    ) {
        metrics::with_local_recorder(&*self.recorder, || {
            histogram!(REQUEST_DURATION, "service" => service.clone(), "method" => method.clone())
                .record(elapsed.as_secs_f64());
        });
    }

    /// Prometheus text exposition of every series recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Router serving the exposition at `path`.
    pub fn router(&self, path: &str) -> Router {
        Router::new()
            .route(path, get(metrics_handler))
            .with_state(self.clone())
    }
}

async fn metrics_handler(State(registry): State<MetricsRegistry>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], registry.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn label(value: &str) -> SharedString {
        SharedString::from(Arc::<str>::from(value))
    }

    fn sample<'a>(text: &'a str, name: &str, extra: &str) -> Option<&'a str> {
        text.lines()
            .filter(|line| line.starts_with(name))
            .filter(|line| line.contains(r#"service="users""#))
            .filter(|line| line.contains(r#"method="/users.v1.Users/Get""#))
            .find(|line| line.contains(extra))
            .and_then(|line| line.rsplit(' ').next())
    }

    #[test]
    fn records_labelled_series() {
        let registry = MetricsRegistry::register().unwrap();
        let (service, method) = (label("users"), label("/users.v1.Users/Get"));
        registry.record_request(&service, &method);
        registry.record_request(&service, &method);
        registry.record_duration(&service, &method, Duration::from_millis(30));

        let text = registry.render();
        assert_eq!(sample(&text, "grpc_requests_total{", ""), Some("2"));
        assert_eq!(
            sample(&text, "grpc_request_duration_seconds_bucket{", r#"le="0.05""#),
            Some("1")
        );
        assert_eq!(
            sample(&text, "grpc_request_duration_seconds_bucket{", r#"le="0.025""#),
            Some("0")
        );
        assert_eq!(
            sample(&text, "grpc_request_duration_seconds_count{", ""),
            Some("1")
        );
    }

    #[test]
    fn registries_are_isolated() {
        let first = MetricsRegistry::register().unwrap();
        let second = MetricsRegistry::register().unwrap();
        first.record_request(&label("a"), &label("/a.A/Call"));

        assert!(first.render().contains("grpc_requests_total"));
        assert!(!second.render().contains(r#"service="a""#));
    }

    #[test]
    fn static_and_shared_labels_name_the_same_series() {
        let registry = MetricsRegistry::register().unwrap();
        let method = label("/users.v1.Users/Get");
        registry.record_request(&SharedString::const_str("users"), &method);
        registry.record_request(&label("users"), &method);

        assert_eq!(sample(&registry.render(), "grpc_requests_total{", ""), Some("2"));
    }

    #[tokio::test]
    async fn endpoint_serves_exposition() {
        let registry = MetricsRegistry::register().unwrap();
        registry.record_request(&label("users"), &label("/users.v1.Users/Get"));

        let response = registry
            .router("/metrics")
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("grpc_requests_total"));
    }
}
