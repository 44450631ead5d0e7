//! Audit query endpoint.

use crate::error::{ApiError, ApiResult, success};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use urumi_metadata::models::{AuditQuery, AuditRow};

/// Query parameters for GET /api/audit.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryParams {
    pub store_id: Option<String>,
    pub action: Option<String>,
    pub limit: Option<u32>,
}

/// Audit entry as rendered to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntryResponse {
    pub id: i64,
    pub action: String,
    pub store_id: Option<String>,
    pub store_name: Option<String>,
    pub engine: Option<String>,
    pub source_ip: Option<String>,
    pub details: Option<Value>,
    pub duration_ms: Option<i64>,
    pub created_at: String,
}

impl AuditEntryResponse {
    fn from_row(row: &AuditRow) -> ApiResult<Self> {
        let details = row
            .details
            .as_ref()
            .map(|raw| serde_json::from_str(raw).unwrap_or(Value::String(raw.clone())));
        Ok(Self {
            id: row.audit_id,
            action: row.action.clone(),
            store_id: row.store_id.clone(),
            store_name: row.store_name.clone(),
            engine: row.engine.clone(),
            source_ip: row.source_ip.clone(),
            details,
            duration_ms: row.duration_ms,
            created_at: row
                .created_at
                .format(&Rfc3339)
                .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))?,
        })
    }
}

/// GET /api/audit - query audit entries, newest first.
pub async fn query_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> ApiResult<Json<Value>> {
    let query = AuditQuery {
        store_id: params.store_id,
        action: params.action,
        limit: params.limit,
    };
    let rows = state.audit.query(&query).await?;
    let entries = rows
        .iter()
        .map(AuditEntryResponse::from_row)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(success(json!({ "entries": entries })))
}
