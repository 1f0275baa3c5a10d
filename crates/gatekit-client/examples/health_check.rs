//! Generic health check against any tonic server exposing `grpc.health.v1`.
//!
//! Run the example server first:
//! ```bash
//! cargo run -p gatekit-server --example users_server
//! ```
//!
//! Then run this client:
//! ```bash
//! GATEKIT_CLIENT_ENDPOINT=localhost:50051 cargo run -p gatekit-client --example health_check
//! ```

use gatekit_client::{init_logging_from_env, Client, ClientConfig};
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};

const HEALTH_CHECK: &str = "/grpc.health.v1.Health/Check";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env();

    let config = ClientConfig::builder()
        .with_dotenv()
        .with_env_prefix("GATEKIT_CLIENT")
        .max_retries(3)
        .build()?;

    tracing::info!(endpoint = %config.endpoint_uri(), "Connecting to gRPC server");
    let client = Client::connect(config).await?;

    for service in ["", "message_service.users.v1.UsersService"] {
        let reply = client
            .request(
                HEALTH_CHECK,
                HealthCheckRequest {
                    service: service.to_string(),
                },
                HealthCheckResponse::default(),
            )
            .send()
            .await;

        match reply {
            Ok(reply) => println!("{service:?}: {:?}", reply.status()),
            Err(err) => println!("{service:?}: {err}"),
        }
    }

    client.close();
    Ok(())
}
