//! The invocation client: one long-lived connection plus call defaults.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::Channel;
use tonic::Status;

use crate::backoff::BackoffPolicy;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::request::{normalize_method, Request};
use crate::transport::{build_endpoint, Transport};

/// Future returned by a [`MethodHandler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, Status>> + Send>>;

/// Custom handler for a method, operating on encoded messages.
///
/// Handlers are an extension point for callers that want to short-circuit or
/// fake specific methods; [`Request::send`] never consults them.
pub type MethodHandler = Arc<dyn Fn(Vec<u8>) -> HandlerFuture + Send + Sync>;

/// A gRPC client owning a single reusable connection.
///
/// # Example
///
/// ```ignore
/// use gatekit_client::{Client, ClientConfig};
///
/// let client = Client::connect(
///     ClientConfig::builder()
///         .endpoint("localhost:50051")
///         .timeout_secs(10)
///         .build()?,
/// )
/// .await?;
///
/// let reply = client
///     .request("message_service.users.v1.UsersService/GetStatusInfo", Req { input: 3 }, Resp::default())
///     .send()
///     .await?;
/// ```
pub struct Client<T = Channel> {
    transport: T,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    backoff: BackoffPolicy,
    metadata: MetadataMap,
    handlers: HashMap<String, MethodHandler>,
}

impl Client<Channel> {
    /// Connect eagerly; fails if the server is unreachable.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let endpoint = build_endpoint(&config)?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|source| ClientError::Connect {
                endpoint: config.endpoint_uri(),
                source,
            })?;

        tracing::debug!(endpoint = %config.endpoint_uri(), "gRPC client connected");
        Self::from_transport(channel, config)
    }

    /// Create a client whose connection is established on the first call.
    pub fn connect_lazy(config: ClientConfig) -> Result<Self, ClientError> {
        let endpoint = build_endpoint(&config)?;
        Self::from_transport(endpoint.connect_lazy(), config)
    }
}

impl<T: Transport> Client<T> {
    /// Wrap an existing transport.
    pub fn from_transport(transport: T, config: ClientConfig) -> Result<Self, ClientError> {
        let metadata = metadata_from_pairs(&config.metadata)?;

        Ok(Self {
            transport,
            endpoint: config.endpoint_uri(),
            timeout: config.timeout(),
            max_retries: config.max_retries,
            backoff: BackoffPolicy::default().with_jitter(config.backoff_jitter),
            metadata,
            handlers: HashMap::new(),
        })
    }

    /// Register a custom handler for `method`.
    pub fn with_handler(mut self, method: impl AsRef<str>, handler: MethodHandler) -> Self {
        self.handlers
            .insert(normalize_method(method.as_ref()), handler);
        self
    }

    /// Look up the custom handler registered for `method`.
    pub fn handler(&self, method: &str) -> Option<&MethodHandler> {
        self.handlers.get(&normalize_method(method))
    }

    /// Start building a call of `method` with `body`, decoding into `response`.
    pub fn request<Req, Resp>(
        &self,
        method: impl Into<String>,
        body: Req,
        response: Resp,
    ) -> Request<'_, Req, Resp, T> {
        Request::new(self, method.into(), body, response)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts a single call may make: `max_retries + 1`.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn default_metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Close the connection. Outstanding requests borrow the client, so none
    /// can outlive this call.
    pub fn close(self) {
        tracing::debug!(endpoint = %self.endpoint, "gRPC client closed");
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("metadata", &self.metadata)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn metadata_from_pairs<'a>(
    pairs: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<MetadataMap, ClientError> {
    let mut metadata = MetadataMap::new();
    for (key, value) in pairs {
        let name = AsciiMetadataKey::from_bytes(key.as_bytes()).map_err(|e| {
            ClientError::InvalidMetadata {
                key: key.clone(),
                reason: e.to_string(),
            }
        })?;
        let value = AsciiMetadataValue::try_from(value.as_str()).map_err(|e| {
            ClientError::InvalidMetadata {
                key: key.clone(),
                reason: e.to_string(),
            }
        })?;
        metadata.insert(name, value);
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_lazy_without_server() {
        let config = ClientConfig {
            endpoint: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let client = Client::connect_lazy(config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:1");
        assert_eq!(client.timeout(), Duration::from_secs(5));
        assert_eq!(client.max_retries(), 1);
        assert_eq!(client.max_attempts(), 2);
    }

    #[tokio::test]
    async fn max_attempts_saturates() {
        let config = ClientConfig {
            endpoint: "127.0.0.1:1".to_string(),
            max_retries: u32::MAX,
            ..Default::default()
        };
        let client = Client::connect_lazy(config).unwrap();
        assert_eq!(client.max_attempts(), u32::MAX);
    }

    #[tokio::test]
    async fn connect_fails_fast_when_unreachable() {
        let config = ClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            connect_timeout_secs: 1,
            ..Default::default()
        };
        let err = Client::connect(config).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[tokio::test]
    async fn default_metadata_is_parsed() {
        let config = ClientConfig::builder()
            .with_env_prefix("GATEKIT_CLIENT_TEST_METADATA")
            .endpoint("127.0.0.1:1")
            .metadata("x-tenant", "acme")
            .build()
            .unwrap();
        let client = Client::connect_lazy(config).unwrap();
        assert_eq!(
            client.default_metadata().get("x-tenant").unwrap().to_str().unwrap(),
            "acme"
        );
    }

    #[tokio::test]
    async fn invalid_metadata_is_rejected() {
        let mut config = ClientConfig {
            endpoint: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        config
            .metadata
            .insert("bad key".to_string(), "value".to_string());

        let err = Client::connect_lazy(config).unwrap_err();
        assert!(matches!(err, ClientError::InvalidMetadata { key, .. } if key == "bad key"));
    }

    #[tokio::test]
    async fn handlers_are_keyed_by_normalized_method() {
        let handler: MethodHandler =
            Arc::new(|body: Vec<u8>| -> HandlerFuture { Box::pin(async move { Ok(body) }) });
        let config = ClientConfig {
            endpoint: "127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let client = Client::connect_lazy(config)
            .unwrap()
            .with_handler("pkg.Echo/Say", handler);

        assert!(client.handler("/pkg.Echo/Say").is_some());
        assert!(client.handler("pkg.Echo/Say").is_some());
        assert!(client.handler("/pkg.Echo/Other").is_none());

        let echoed = (client.handler("pkg.Echo/Say").unwrap())(vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(echoed, vec![1, 2, 3]);
    }
}
