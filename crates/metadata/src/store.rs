//! Metadata store trait and the SQLite implementation.

use crate::error::MetadataResult;
use crate::models::{
    AUDIT_QUERY_DEFAULT_LIMIT, AuditQuery, AuditRow, NewAuditEntry, StorePatch, StoreRow,
};
use crate::repos::{AuditRepo, StoreRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// SQLite schema (embedded).
const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");

/// Combined metadata store trait: store records plus the audit log, with
/// schema management and a health probe.
#[async_trait]
pub trait MetadataStore: StoreRepo + AuditRepo + Send + Sync {
    /// Create the schema if absent.
    async fn migrate(&self) -> MetadataResult<()>;

    /// One trivial read to verify connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, applying the schema on startup.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // "database is locked" failures under worker/handler concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in schema_statements(SQLITE_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Split an embedded schema file into individual statements.
pub(crate) fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

#[async_trait]
impl StoreRepo for SqliteStore {
    async fn create_store(&self, store: &StoreRow) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stores (
                store_id, name, namespace, engine, status, phase,
                url, admin_url, db_ready, app_ready, error_message, error_phase,
                created_at, updated_at, ready_at, deleted_at, provisioning_duration_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&store.store_id)
        .bind(&store.name)
        .bind(&store.namespace)
        .bind(&store.engine)
        .bind(&store.status)
        .bind(&store.phase)
        .bind(&store.url)
        .bind(&store.admin_url)
        .bind(store.db_ready)
        .bind(store.app_ready)
        .bind(&store.error_message)
        .bind(&store.error_phase)
        .bind(store.created_at)
        .bind(store.updated_at)
        .bind(store.ready_at)
        .bind(store.deleted_at)
        .bind(store.provisioning_duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_store(
        &self,
        store_id: &str,
        patch: &StorePatch,
    ) -> MetadataResult<Option<StoreRow>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE stores SET updated_at = ");
        push_store_patch(&mut builder, patch, store_id);
        let row = builder
            .build_query_as::<StoreRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_store(&self, store_id: &str) -> MetadataResult<Option<StoreRow>> {
        let row = sqlx::query_as::<_, StoreRow>("SELECT * FROM stores WHERE store_id = ?1")
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_stores(&self) -> MetadataResult<Vec<StoreRow>> {
        let rows = sqlx::query_as::<_, StoreRow>(
            "SELECT * FROM stores WHERE status != 'deleted' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_inflight_stores(&self) -> MetadataResult<Vec<StoreRow>> {
        let rows = sqlx::query_as::<_, StoreRow>(
            "SELECT * FROM stores WHERE status IN ('pending', 'provisioning', 'deleting')",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_active_stores(&self) -> MetadataResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stores WHERE status NOT IN ('failed', 'deleted')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn soft_delete_store(&self, store_id: &str) -> MetadataResult<Option<StoreRow>> {
        let now = OffsetDateTime::now_utc();
        let row = sqlx::query_as::<_, StoreRow>(
            "UPDATE stores SET status = 'deleted', deleted_at = ?1, updated_at = ?1 \
             WHERE store_id = ?2 RETURNING *",
        )
        .bind(now)
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl AuditRepo for SqliteStore {
    async fn append_audit(&self, entry: &NewAuditEntry) -> MetadataResult<AuditRow> {
        let details = entry.details.as_ref().map(|value| value.to_string());
        let row = sqlx::query_as::<_, AuditRow>(
            r#"
            INSERT INTO audit_log (
                action, store_id, store_name, engine, source_ip, details, duration_ms, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(&entry.action)
        .bind(&entry.store_id)
        .bind(&entry.store_name)
        .bind(&entry.engine)
        .bind(&entry.source_ip)
        .bind(details)
        .bind(entry.duration_ms)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn query_audit(&self, query: &AuditQuery) -> MetadataResult<Vec<AuditRow>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM audit_log WHERE 1 = 1");
        push_audit_filters(&mut builder, query);
        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// Append the SET list, WHERE clause, and RETURNING to a store update.
/// One statement per update, as the repository contract requires.
fn push_store_patch(builder: &mut QueryBuilder<'_, Sqlite>, patch: &StorePatch, store_id: &str) {
    builder.push_bind(OffsetDateTime::now_utc());
    if let Some(status) = &patch.status {
        builder.push(", status = ").push_bind(status.clone());
    }
    if let Some(phase) = &patch.phase {
        builder.push(", phase = ").push_bind(phase.clone());
    }
    if let Some(url) = &patch.url {
        builder.push(", url = ").push_bind(url.clone());
    }
    if let Some(admin_url) = &patch.admin_url {
        builder.push(", admin_url = ").push_bind(admin_url.clone());
    }
    if let Some(db_ready) = patch.db_ready {
        builder.push(", db_ready = ").push_bind(db_ready);
    }
    if let Some(app_ready) = patch.app_ready {
        builder.push(", app_ready = ").push_bind(app_ready);
    }
    if let Some(error_message) = &patch.error_message {
        builder
            .push(", error_message = ")
            .push_bind(error_message.clone());
    }
    if let Some(error_phase) = &patch.error_phase {
        builder
            .push(", error_phase = ")
            .push_bind(error_phase.clone());
    }
    if let Some(ready_at) = patch.ready_at {
        builder.push(", ready_at = ").push_bind(ready_at);
    }
    if let Some(duration) = patch.provisioning_duration_ms {
        builder
            .push(", provisioning_duration_ms = ")
            .push_bind(duration);
    }
    builder
        .push(" WHERE store_id = ")
        .push_bind(store_id.to_string());
    builder.push(" RETURNING *");
}

/// Append audit filters, ordering, and limit to an audit query.
fn push_audit_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &AuditQuery) {
    if let Some(store_id) = &query.store_id {
        builder.push(" AND store_id = ").push_bind(store_id.clone());
    }
    if let Some(action) = &query.action {
        builder.push(" AND action = ").push_bind(action.clone());
    }
    let limit = query.limit.unwrap_or(AUDIT_QUERY_DEFAULT_LIMIT);
    builder
        .push(" ORDER BY audit_id DESC LIMIT ")
        .push_bind(limit as i64);
}
