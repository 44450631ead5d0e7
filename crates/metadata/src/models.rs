//! Database models mapping to the state schema.

use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Store records
// =============================================================================

/// Durable store record. `namespace` is always `store-{store_id}` and is
/// never mutated after creation.
#[derive(Debug, Clone, FromRow)]
pub struct StoreRow {
    pub store_id: String,
    pub name: String,
    pub namespace: String,
    pub engine: String,
    pub status: String,
    /// Present only while status is `provisioning`.
    pub phase: Option<String>,
    pub url: Option<String>,
    pub admin_url: Option<String>,
    pub db_ready: bool,
    pub app_ready: bool,
    pub error_message: Option<String>,
    pub error_phase: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub ready_at: Option<OffsetDateTime>,
    pub deleted_at: Option<OffsetDateTime>,
    pub provisioning_duration_ms: Option<i64>,
}

/// Partial update for a store record. Outer `None` leaves a column
/// untouched; for nullable columns, `Some(None)` writes NULL.
#[derive(Debug, Clone, Default)]
pub struct StorePatch {
    pub status: Option<String>,
    pub phase: Option<Option<String>>,
    pub url: Option<String>,
    pub admin_url: Option<String>,
    pub db_ready: Option<bool>,
    pub app_ready: Option<bool>,
    pub error_message: Option<Option<String>>,
    pub error_phase: Option<Option<String>>,
    pub ready_at: Option<OffsetDateTime>,
    pub provisioning_duration_ms: Option<i64>,
}

// =============================================================================
// Audit log
// =============================================================================

/// Append-only audit record. Ids are assigned by the database and are
/// monotonic in append order.
#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub audit_id: i64,
    pub action: String,
    pub store_id: Option<String>,
    pub store_name: Option<String>,
    pub engine: Option<String>,
    pub source_ip: Option<String>,
    /// Free-form details, JSON-rendered.
    pub details: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: OffsetDateTime,
}

/// A new audit entry before the database assigns id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewAuditEntry {
    pub action: String,
    pub store_id: Option<String>,
    pub store_name: Option<String>,
    pub engine: Option<String>,
    pub source_ip: Option<String>,
    pub details: Option<serde_json::Value>,
    pub duration_ms: Option<i64>,
}

/// Filters for audit queries. Results are returned newest first.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub store_id: Option<String>,
    pub action: Option<String>,
    pub limit: Option<u32>,
}

/// Default cap on audit query results.
pub const AUDIT_QUERY_DEFAULT_LIMIT: u32 = 50;
