//! Store record repository trait.

use crate::error::MetadataResult;
use crate::models::{StorePatch, StoreRow};
use async_trait::async_trait;

/// Repository for store records.
///
/// The orchestrator owns all mutations after the initial insert; the
/// admission surface only reads and creates.
#[async_trait]
pub trait StoreRepo: Send + Sync {
    /// Insert a new store record. The caller supplies the id and initial
    /// timestamps.
    async fn create_store(&self, store: &StoreRow) -> MetadataResult<()>;

    /// Apply a partial update. `updated_at` is always refreshed. Returns
    /// the updated row, or None when the id is unknown.
    async fn update_store(&self, store_id: &str, patch: &StorePatch)
    -> MetadataResult<Option<StoreRow>>;

    /// Fetch one record by id.
    async fn get_store(&self, store_id: &str) -> MetadataResult<Option<StoreRow>>;

    /// List records excluding `deleted`, newest first.
    async fn list_stores(&self) -> MetadataResult<Vec<StoreRow>>;

    /// Records left in flight (pending/provisioning/deleting) by a
    /// previous process; used for startup recovery.
    async fn list_inflight_stores(&self) -> MetadataResult<Vec<StoreRow>>;

    /// Count records whose status is neither `failed` nor `deleted`.
    async fn count_active_stores(&self) -> MetadataResult<u32>;

    /// Mark a record deleted and stamp `deleted_at`. Returns the updated
    /// row, or None when the id is unknown.
    async fn soft_delete_store(&self, store_id: &str) -> MetadataResult<Option<StoreRow>>;
}
