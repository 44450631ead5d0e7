//! Gateway error types and retryability classification.

use thiserror::Error;

/// Errors surfaced by the cluster gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The API server answered with a non-success status.
    #[error("cluster API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced an API answer.
    #[error("cluster transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Pod exec channel failure.
    #[error("pod exec error: {0}")]
    Exec(String),

    /// Cluster connection could not be resolved.
    #[error("cluster configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Build an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether a retry may succeed: transport failures (connection
    /// refused, DNS, dial timeout) and the transient status codes
    /// {429, 500, 502, 503, 504}. Other 4xx are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_connect() || err.is_timeout(),
            Self::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Whether the API reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Whether the API reported a conflicting existing object.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
