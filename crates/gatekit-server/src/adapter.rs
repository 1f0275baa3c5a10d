//! The registration seam between application services and the server.

use tonic::service::RoutesBuilder;
use tonic::transport::Channel;

use crate::error::BoxError;

/// A unit of application logic that attaches itself to both protocols.
///
/// # Example
///
/// ```ignore
/// use axum::{routing::post, Json, Router};
/// use gatekit_server::{BoxError, ServiceAdapter};
/// use tonic::service::RoutesBuilder;
/// use tonic::transport::Channel;
///
/// struct Users;
///
/// impl ServiceAdapter for Users {
///     fn name(&self) -> &str {
///         "users"
///     }
///
///     fn attach_to_server(&self, routes: &mut RoutesBuilder) {
///         routes.add_service(UsersServiceServer::new(UsersImpl));
///     }
///
///     fn attach_to_gateway(&self, router: Router, channel: Channel) -> Result<Router, BoxError> {
///         let client = UsersServiceClient::new(channel);
///         Ok(router.route("/v1/users/status", post(move |Json(req)| status(client.clone(), req))))
///     }
/// }
/// ```
pub trait ServiceAdapter: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Register the gRPC service.
    fn attach_to_server(&self, routes: &mut RoutesBuilder);

    /// Register HTTP routes that forward to the service over `channel`, a
    /// connection to this server's own gRPC listener.
    fn attach_to_gateway(&self, router: axum::Router, channel: Channel) -> Result<axum::Router, BoxError>;

    /// Encoded `FileDescriptorSet` published through server reflection.
    fn file_descriptor_set(&self) -> Option<&[u8]> {
        None
    }
}
