//! A small users service, hand-written in the shape tonic-build generates,
//! and the adapter that puts it on both protocols.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use gatekit_client::{Client, ClientConfig};
use gatekit_server::{BoxError, GatewayError, ServiceAdapter};
use tonic::codegen::{empty_body, http, Body, BoxFuture, StdError};
use tonic::service::RoutesBuilder;
use tonic::transport::Channel;
use tonic::Status;

pub const SERVICE_NAME: &str = "message_service.users.v1.UsersService";
pub const GET_STATUS_INFO: &str = "/message_service.users.v1.UsersService/GetStatusInfo";

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct StatusRequest {
    #[prost(int32, tag = "1")]
    pub input: i32,
}

#[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
pub struct StatusReply {
    #[prost(int32, tag = "1")]
    pub input: i32,
    #[prost(int32, tag = "2")]
    pub output: i32,
}

/// Answers `GetStatusInfo` with the input echoed and `output = 42`.
/// A negative input is rejected with `InvalidArgument`.
#[derive(Clone, Default)]
pub struct UsersServer;

struct GetStatusInfoSvc;

impl tonic::server::UnaryService<StatusRequest> for GetStatusInfoSvc {
    type Response = StatusReply;
    type Future = BoxFuture<tonic::Response<StatusReply>, Status>;

    fn call(&mut self, request: tonic::Request<StatusRequest>) -> Self::Future {
        Box::pin(async move {
            let input = request.into_inner().input;
            if input < 0 {
                return Err(Status::invalid_argument("input must not be negative"));
            }
            Ok(tonic::Response::new(StatusReply { input, output: 42 }))
        })
    }
}

impl<B> tonic::codegen::Service<http::Request<B>> for UsersServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            GET_STATUS_INFO => Box::pin(async move {
                let mut grpc = tonic::server::Grpc::new(tonic::codec::ProstCodec::default());
                Ok(grpc.unary(GetStatusInfoSvc, req).await)
            }),
            _ => Box::pin(async move {
                let mut response = http::Response::new(empty_body());
                let headers = response.headers_mut();
                headers.insert(
                    Status::GRPC_STATUS,
                    (tonic::Code::Unimplemented as i32).into(),
                );
                headers.insert(
                    http::header::CONTENT_TYPE,
                    tonic::metadata::GRPC_CONTENT_TYPE,
                );
                Ok(response)
            }),
        }
    }
}

impl tonic::server::NamedService for UsersServer {
    const NAME: &'static str = SERVICE_NAME;
}

/// Registers [`UsersServer`] and `POST /v1/users/status` on the gateway.
#[derive(Default)]
pub struct UsersAdapter;

impl ServiceAdapter for UsersAdapter {
    fn name(&self) -> &str {
        "users"
    }

    fn attach_to_server(&self, routes: &mut RoutesBuilder) {
        routes.add_service(UsersServer);
    }

    fn attach_to_gateway(&self, router: Router, channel: Channel) -> Result<Router, BoxError> {
        let client = Arc::new(Client::from_transport(channel, ClientConfig::default())?);
        Ok(router.route("/v1/users/status", post(get_status_info).with_state(client)))
    }
}

async fn get_status_info(
    State(client): State<Arc<Client>>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusReply>, GatewayError> {
    let reply = client
        .request(GET_STATUS_INFO, request, StatusReply::default())
        .send()
        .await
        .map_err(Status::from)?;
    Ok(Json(reply))
}
