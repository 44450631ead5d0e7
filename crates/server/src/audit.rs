//! Audit log service: durable append plus a redacted mirror into the
//! structured log pipeline.

use std::sync::Arc;
use urumi_core::secrets::redact_value;
use urumi_metadata::models::{AuditQuery, AuditRow, NewAuditEntry};
use urumi_metadata::{MetadataResult, MetadataStore};

/// Audit action tags.
pub mod actions {
    pub const STORE_CREATE_REQUESTED: &str = "store.create.requested";
    pub const STORE_CREATE_STARTED: &str = "store.create.started";
    pub const STORE_CREATE_SUCCEEDED: &str = "store.create.succeeded";
    pub const STORE_CREATE_FAILED: &str = "store.create.failed";
    pub const STORE_DELETE_REQUESTED: &str = "store.delete.requested";
    pub const STORE_DELETE_SUCCEEDED: &str = "store.delete.succeeded";
    pub const STORE_DELETE_FAILED: &str = "store.delete.failed";
    pub const STORE_RECOVERED: &str = "store.recovered";
}

/// Who did what, when, from where. Entries persist in the same backend
/// as store records and are mirrored to the log with secrets redacted.
#[derive(Clone)]
pub struct AuditLog {
    metadata: Arc<dyn MetadataStore>,
}

impl AuditLog {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    /// Append one entry. Audit failures are logged, never propagated; the
    /// operation being audited must not fail because the log write did.
    pub async fn record(&self, entry: NewAuditEntry) {
        let mut log_details = entry.details.clone().unwrap_or_default();
        redact_value(&mut log_details);

        match self.metadata.append_audit(&entry).await {
            Ok(row) => {
                tracing::info!(
                    audit_id = row.audit_id,
                    action = %row.action,
                    store_id = row.store_id.as_deref().unwrap_or("-"),
                    source_ip = row.source_ip.as_deref().unwrap_or("-"),
                    details = %log_details,
                    "audit"
                );
            }
            Err(err) => {
                tracing::error!(
                    action = %entry.action,
                    error = %err,
                    "Failed to persist audit entry"
                );
            }
        }
    }

    /// Query entries, newest first.
    pub async fn query(&self, query: &AuditQuery) -> MetadataResult<Vec<AuditRow>> {
        self.metadata.query_audit(query).await
    }
}
