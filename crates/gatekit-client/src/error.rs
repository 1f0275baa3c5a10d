//! Error types for client construction and invocation.

use tonic::{Code, Status};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while constructing a [`Client`](crate::Client).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] gatekit_core::ConfigError),

    #[error("invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid metadata entry `{key}`: {reason}")]
    InvalidMetadata { key: String, reason: String },

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
}

/// Terminal outcome of a failed [`Request::send`](crate::Request::send).
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The method identifier is not a valid request path; nothing was sent.
    #[error("invalid method `{method}`: {reason}")]
    InvalidMethod { method: String, reason: String },

    /// Every attempt failed with a retryable status.
    #[error("retries exhausted after {attempts} attempts: {:?}: {}", .status.code(), .status.message())]
    RetriesExhausted { attempts: u32, status: Status },

    /// The call failed with a status that is never retried.
    #[error("non-retryable status {:?}: {}", .status.code(), .status.message())]
    NonRetryable { status: Status },

    /// The call failed without producing a status.
    #[error("unknown failure: {0}")]
    Unknown(#[source] BoxError),
}

impl InvokeError {
    /// Status code of the terminal failure, if the call produced one.
    pub fn code(&self) -> Option<Code> {
        self.status().map(Status::code)
    }

    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::RetriesExhausted { status, .. } | Self::NonRetryable { status } => Some(status),
            Self::InvalidMethod { .. } | Self::Unknown(_) => None,
        }
    }

    /// Whether retries ran out, as opposed to a single terminal failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

impl From<InvokeError> for Status {
    fn from(err: InvokeError) -> Self {
        let message = err.to_string();
        match err {
            InvokeError::RetriesExhausted { status, .. } | InvokeError::NonRetryable { status } => {
                status
            }
            InvokeError::InvalidMethod { .. } => Status::unimplemented(message),
            InvokeError::Unknown(_) => Status::unknown(message),
        }
    }
}
