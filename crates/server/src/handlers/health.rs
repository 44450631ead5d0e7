//! Health endpoints for probes and load balancers. Intentionally
//! unauthenticated and exempt from rate limiting.

use crate::error::success;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

/// GET /health/live - the process is up.
pub async fn health_live() -> Json<Value> {
    success(json!({ "status": "alive" }))
}

/// GET /health/ready - 200 iff both the cluster gateway and the state
/// database answer; 503 otherwise.
pub async fn health_ready(State(state): State<AppState>) -> Response {
    let gateway = state.gateway.health_ping().await;
    let metadata = state.metadata.health_check().await;

    match (&gateway, &metadata) {
        (Ok(()), Ok(())) => success(json!({
            "status": "ready",
            "version": env!("CARGO_PKG_VERSION"),
        }))
        .into_response(),
        _ => {
            if let Err(err) = &gateway {
                tracing::warn!(error = %err, "Readiness: cluster gateway unreachable");
            }
            if let Err(err) = &metadata {
                tracing::warn!(error = %err, "Readiness: state database unreachable");
            }
            let body = json!({
                "success": false,
                "error": {
                    "code": "not-ready",
                    "message": "a backing service is unavailable",
                    "details": {
                        "gateway": gateway.is_ok(),
                        "database": metadata.is_ok(),
                    }
                }
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}
