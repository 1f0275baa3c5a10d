//! Standard gRPC health checking (`grpc.health.v1.Health`).
//!
//! The server reports the overall status under the empty service name:
//! `Serving` once both serve loops run, `NotServing` from shutdown on.

pub use tonic_health::server::HealthReporter;
pub use tonic_health::ServingStatus;

/// Overall server status, as queried with an empty service name.
pub const SERVER_HEALTH: &str = "";

/// A health service and its reporter, initially `NotServing`.
pub fn health_service() -> (
    HealthReporter,
    tonic_health::pb::health_server::HealthServer<impl tonic_health::pb::health_server::Health>,
) {
    tonic_health::server::health_reporter()
}

pub(crate) async fn report(reporter: &mut HealthReporter, status: ServingStatus) {
    tracing::debug!(status = ?status, "Updating health status");
    reporter.set_service_status(SERVER_HEALTH, status).await;
}
