//! Users service over gRPC and HTTP/JSON
//!
//! Run with:
//! ```bash
//! APP_GRPC_PORT=50051 APP_GATEWAY_PORT=8080 cargo run -p gatekit-server --example users_server
//! ```
//!
//! Test with grpcurl:
//! ```bash
//! # List services
//! grpcurl -plaintext localhost:50051 list
//!
//! # Check health
//! grpcurl -plaintext localhost:50051 grpc.health.v1.Health/Check
//! ```
//!
//! Through the gateway:
//! ```bash
//! curl -X POST localhost:8080/v1/users/status -d '{"input": 3}' -H 'content-type: application/json'
//! curl localhost:9090/metrics
//! ```

mod common;

use gatekit_server::{
    init_logging_from_env, request_id_interceptor, signal_token, Server, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env();

    let config: ServerConfig = ServerConfig::builder()
        .with_dotenv()
        .with_env_prefix("APP")
        .build()?;

    let server = Server::builder(config)
        .adapter(common::UsersAdapter)
        .interceptor(request_id_interceptor)
        .build();

    server.start(signal_token()).await?;
    Ok(())
}
