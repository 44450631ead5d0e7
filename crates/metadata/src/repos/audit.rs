//! Append-only audit log repository trait.

use crate::error::MetadataResult;
use crate::models::{AuditQuery, AuditRow, NewAuditEntry};
use async_trait::async_trait;

/// Repository for audit entries. Entries are never mutated or deleted;
/// ids are assigned by the database and are monotonic in append order.
#[async_trait]
pub trait AuditRepo: Send + Sync {
    /// Append one entry and return it with its assigned id and timestamp.
    async fn append_audit(&self, entry: &NewAuditEntry) -> MetadataResult<AuditRow>;

    /// Query entries, newest first, optionally filtered by store id and
    /// action, capped by the query limit (default 50).
    async fn query_audit(&self, query: &AuditQuery) -> MetadataResult<Vec<AuditRow>>;
}
