//! A single logical call and its retry loop.

use std::time::Duration;

use http::uri::PathAndQuery;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::Status;

use crate::backoff::is_retryable;
use crate::client::Client;
use crate::error::InvokeError;
use crate::transport::{CallError, Transport};

/// Prefix `method` with `/` when missing, so both `pkg.Svc/Method` and
/// `/pkg.Svc/Method` address the same RPC.
pub(crate) fn normalize_method(method: &str) -> String {
    let method = method.trim();
    if method.starts_with('/') {
        method.to_string()
    } else {
        format!("/{}", method)
    }
}

fn parse_method(method: &str) -> Result<PathAndQuery, InvokeError> {
    let normalized = normalize_method(method);
    let invalid = |reason: String| InvokeError::InvalidMethod {
        method: method.to_string(),
        reason,
    };

    // "/" plus "Service/Method" at minimum
    if normalized.len() < 4 || !normalized[1..].contains('/') {
        return Err(invalid("expected `package.Service/Method`".to_string()));
    }

    PathAndQuery::try_from(normalized.as_str()).map_err(|e| invalid(e.to_string()))
}

/// One logical unary call built from a [`Client`].
///
/// The request borrows its client, so the client's connection outlives it.
/// The response container is owned by the request; on success the decoded
/// reply replaces it and is handed back to the caller.
#[must_use = "a request does nothing until `send` is awaited"]
pub struct Request<'c, Req, Resp, T = Channel> {
    client: &'c Client<T>,
    method: String,
    body: Req,
    response: Resp,
    metadata: Option<MetadataMap>,
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
}

impl<'c, Req, Resp, T> Request<'c, Req, Resp, T>
where
    T: Transport,
{
    pub(crate) fn new(client: &'c Client<T>, method: String, body: Req, response: Resp) -> Self {
        Self {
            client,
            method,
            body,
            response,
            metadata: None,
            deadline: None,
            cancellation: None,
        }
    }

    /// Replace the client's default metadata for this call.
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Bound the call by the caller's own deadline. The client timeout still
    /// applies; whichever expires first wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Same as [`with_deadline`](Self::with_deadline) measured from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Abort the call (including a pending backoff) when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Execute the call, retrying transient failures.
    ///
    /// At most `max_retries + 1` attempts are made. Between attempts the
    /// caller sleeps for the backoff delay of the retry index. Failures that
    /// carry no status are returned immediately.
    pub async fn send(self) -> Result<Resp, InvokeError>
    where
        Req: prost::Message + Clone + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let Request {
            client,
            method,
            body,
            mut response,
            metadata,
            deadline,
            cancellation,
        } = self;

        let path = parse_method(&method)?;

        let client_deadline = Instant::now() + client.timeout();
        let deadline = deadline.map_or(client_deadline, |d| d.min(client_deadline));
        let metadata = metadata.unwrap_or_else(|| client.default_metadata().clone());
        let cancellation = cancellation.unwrap_or_default();
        let max_attempts = client.max_attempts();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let status = match call_once::<Req, Resp, T>(
                client.transport(),
                &path,
                &body,
                &metadata,
                deadline,
                &cancellation,
                &mut response,
            )
            .await
            {
                Ok(()) => return Ok(response),
                Err(CallError::Other(source)) => {
                    tracing::debug!(method = %path, attempt, error = %source, "gRPC call failed without status");
                    return Err(InvokeError::Unknown(source));
                }
                Err(CallError::Status(status)) => status,
            };

            let retryable = is_retryable(status.code());
            if !retryable {
                return Err(InvokeError::NonRetryable { status });
            }
            if attempt >= max_attempts {
                return Err(InvokeError::RetriesExhausted {
                    attempts: attempt,
                    status,
                });
            }

            let delay = client.backoff().delay(attempt - 1);
            tracing::warn!(
                method = %path,
                attempt,
                max_attempts,
                code = ?status.code(),
                delay_ms = delay.as_millis() as u64,
                "retrying gRPC call"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancellation.cancelled() => {
                    return Err(InvokeError::NonRetryable {
                        status: Status::cancelled("call cancelled during backoff"),
                    });
                }
            }
        }
    }
}

async fn call_once<Req, Resp, T>(
    transport: &T,
    path: &PathAndQuery,
    body: &Req,
    metadata: &MetadataMap,
    deadline: Instant,
    cancellation: &CancellationToken,
    response: &mut Resp,
) -> Result<(), CallError>
where
    T: Transport,
    Req: prost::Message + Clone + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    let mut request = tonic::Request::new(body.clone());
    if !metadata.is_empty() {
        *request.metadata_mut() = metadata.clone();
    }
    request.set_timeout(deadline.saturating_duration_since(Instant::now()));

    let call = transport.unary::<Req, Resp>(path.clone(), request);

    let reply = tokio::select! {
        biased;
        _ = cancellation.cancelled() => return Err(Status::cancelled("call cancelled").into()),
        result = tokio::time::timeout_at(deadline, call) => match result {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(Status::deadline_exceeded("deadline exceeded before the call completed").into())
            }
        },
    };

    *response = reply.into_inner();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_leading_slash() {
        assert_eq!(normalize_method("pkg.Svc/Call"), "/pkg.Svc/Call");
        assert_eq!(normalize_method("/pkg.Svc/Call"), "/pkg.Svc/Call");
        assert_eq!(normalize_method("  pkg.Svc/Call "), "/pkg.Svc/Call");
    }

    #[test]
    fn parse_accepts_full_method_names() {
        let path = parse_method("message_service.users.v1.UsersService/GetStatusInfo").unwrap();
        assert_eq!(
            path.as_str(),
            "/message_service.users.v1.UsersService/GetStatusInfo"
        );
    }

    #[test]
    fn parse_rejects_malformed_methods() {
        for method in ["", "/", "NoSlash", "/bad method/with space"] {
            assert!(
                matches!(parse_method(method), Err(InvokeError::InvalidMethod { .. })),
                "{method:?} should be rejected"
            );
        }
    }
}
