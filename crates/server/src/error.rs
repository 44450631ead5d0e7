//! API error types and the response envelope.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use urumi_core::deadline::DeadlineExceeded;

/// Error payload inside the error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable error code for programmatic handling.
    pub code: String,
    /// Human-readable message. Internals are never surfaced verbatim.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("cluster gateway unavailable")]
    Gateway(#[from] urumi_kube::GatewayError),

    #[error("deadline exceeded")]
    DeadlineExceeded(#[from] DeadlineExceeded),

    #[error("internal error")]
    Metadata(#[from] urumi_metadata::MetadataError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not-found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited { .. } => "rate-limited",
            Self::Gateway(_) => "gateway-error",
            Self::DeadlineExceeded(_) => "deadline-exceeded",
            Self::Metadata(_) | Self::Internal(_) => "internal",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Metadata(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Sanitized message shown to clients. Database and gateway
    /// internals stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Metadata(_) => "internal error".to_string(),
            Self::Gateway(_) => "cluster gateway unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }
        let body = serde_json::json!({
            "success": false,
            "error": ErrorBody {
                code: self.code().to_string(),
                message: self.public_message(),
                details: None,
            }
        });
        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self
            && let Ok(value) = retry_after_secs.to_string().parse()
        {
            response.headers_mut().insert("Retry-After", value);
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Wrap payload data in the success envelope.
pub fn success(data: Value) -> Json<Value> {
    Json(serde_json::json!({ "success": true, "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_statuses() {
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("cap".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RateLimited {
                retry_after_secs: 1
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::DeadlineExceeded(DeadlineExceeded).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn metadata_errors_are_sanitized() {
        let err = ApiError::Metadata(urumi_metadata::MetadataError::Internal(
            "connection string with password".to_string(),
        ));
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(err.code(), "internal");
    }
}
