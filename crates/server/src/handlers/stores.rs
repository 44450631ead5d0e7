//! Store endpoints: admission, listing, fetch, deletion.

use crate::audit::actions;
use crate::error::{ApiError, ApiResult, success};
use crate::ratelimit::{ClientIp, RateScope};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Extension, Path, Request, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use urumi_metadata::models::{NewAuditEntry, StoreRow};

/// Create-store request body.
#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    pub name: String,
    pub engine: String,
}

/// Store record as rendered to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub engine: String,
    pub status: String,
    pub phase: Option<String>,
    pub url: Option<String>,
    pub admin_url: Option<String>,
    pub db_ready: bool,
    pub app_ready: bool,
    pub error_message: Option<String>,
    pub error_phase: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub ready_at: Option<String>,
    pub deleted_at: Option<String>,
    pub provisioning_duration_ms: Option<i64>,
}

fn format_timestamp(value: time::OffsetDateTime) -> ApiResult<String> {
    value
        .format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

impl StoreResponse {
    pub fn from_row(row: &StoreRow) -> ApiResult<Self> {
        Ok(Self {
            id: row.store_id.clone(),
            name: row.name.clone(),
            namespace: row.namespace.clone(),
            engine: row.engine.clone(),
            status: row.status.clone(),
            phase: row.phase.clone(),
            url: row.url.clone(),
            admin_url: row.admin_url.clone(),
            db_ready: row.db_ready,
            app_ready: row.app_ready,
            error_message: row.error_message.clone(),
            error_phase: row.error_phase.clone(),
            created_at: format_timestamp(row.created_at)?,
            updated_at: format_timestamp(row.updated_at)?,
            ready_at: row.ready_at.map(format_timestamp).transpose()?,
            deleted_at: row.deleted_at.map(format_timestamp).transpose()?,
            provisioning_duration_ms: row.provisioning_duration_ms,
        })
    }
}

/// POST /api/stores - admit a store and dispatch its pipeline.
pub async fn create_store(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let bytes = axum::body::to_bytes(req.into_body(), state.config.server.body_limit_bytes)
        .await
        .map_err(|e| ApiError::Validation(format!("failed to read body: {e}")))?;
    let body: CreateStoreRequest = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Validation(format!("invalid JSON: {e}")))?;

    state.rate_limit.check(RateScope::CreateStore, &ip)?;

    state
        .audit
        .record(NewAuditEntry {
            action: actions::STORE_CREATE_REQUESTED.to_string(),
            store_name: Some(body.name.clone()),
            engine: Some(body.engine.clone()),
            source_ip: Some(ip),
            ..Default::default()
        })
        .await;

    let record = state.provisioner.admit_store(&body.name, &body.engine).await?;

    // The pipeline runs on its own worker; the caller gets the reserved
    // record immediately.
    let handle = tokio::spawn(state.provisioner.clone().run(record.clone()));
    state
        .workers
        .register(record.store_id.clone(), handle)
        .await;

    let store = StoreResponse::from_row(&record)?;
    Ok((
        StatusCode::ACCEPTED,
        success(json!({
            "store": store,
            "message": "store provisioning started",
        })),
    ))
}

/// GET /api/stores - list non-deleted stores, newest first.
pub async fn list_stores(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rows = state.metadata.list_stores().await?;
    let stores = rows
        .iter()
        .map(StoreResponse::from_row)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(success(json!({ "stores": stores })))
}

/// GET /api/stores/{id} - fetch one record.
pub async fn get_store(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let row = state
        .metadata
        .get_store(&store_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("store {store_id} not found")))?;
    Ok(success(json!({ "store": StoreResponse::from_row(&row)? })))
}

/// DELETE /api/stores/{id} - tear down a store's whole resource graph.
pub async fn delete_store(
    State(state): State<AppState>,
    Path(store_id): Path<String>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
) -> ApiResult<Json<Value>> {
    state.rate_limit.check(RateScope::DeleteStore, &ip)?;

    state
        .audit
        .record(NewAuditEntry {
            action: actions::STORE_DELETE_REQUESTED.to_string(),
            store_id: Some(store_id.clone()),
            source_ip: Some(ip),
            ..Default::default()
        })
        .await;

    let record = state.provisioner.delete_store(&store_id).await?;
    Ok(success(json!({
        "store": StoreResponse::from_row(&record)?,
        "message": "store deleted",
    })))
}
