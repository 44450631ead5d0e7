//! Repository tests over the SQLite store.

mod common;

use common::TestServer;
use urumi_core::store::StoreStatus;
use urumi_metadata::models::StorePatch;

#[tokio::test]
async fn create_and_get_round_trip() {
    let server = TestServer::new().await;
    let inserted = server.insert_store("abc12345", StoreStatus::Ready).await;

    let fetched = server
        .metadata()
        .get_store("abc12345")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.store_id, inserted.store_id);
    assert_eq!(fetched.namespace, "store-abc12345");
    assert_eq!(fetched.status, "ready");
    assert!(!fetched.db_ready);
}

#[tokio::test]
async fn get_unknown_store_is_none() {
    let server = TestServer::new().await;
    assert!(server.metadata().get_store("missing1").await.unwrap().is_none());
}

#[tokio::test]
async fn update_patches_only_provided_fields() {
    let server = TestServer::new().await;
    server
        .insert_store("abc12345", StoreStatus::Provisioning)
        .await;

    let patch = StorePatch {
        db_ready: Some(true),
        phase: Some(Some("application".to_string())),
        ..StorePatch::default()
    };
    let updated = server
        .metadata()
        .update_store("abc12345", &patch)
        .await
        .unwrap()
        .unwrap();

    assert!(updated.db_ready);
    assert_eq!(updated.phase.as_deref(), Some("application"));
    // Untouched columns survive.
    assert_eq!(updated.status, "provisioning");
    assert_eq!(updated.engine, "woocommerce");
}

#[tokio::test]
async fn update_can_null_out_nullable_columns() {
    let server = TestServer::new().await;
    server
        .insert_store("abc12345", StoreStatus::Provisioning)
        .await;

    let patch = StorePatch {
        status: Some("ready".to_string()),
        phase: Some(None),
        url: Some("http://store-abc12345.stores.local".to_string()),
        ..StorePatch::default()
    };
    let updated = server
        .metadata()
        .update_store("abc12345", &patch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, "ready");
    assert!(updated.phase.is_none());
    assert!(updated.url.is_some());
}

#[tokio::test]
async fn update_refreshes_updated_at() {
    let server = TestServer::new().await;
    let inserted = server
        .insert_store("abc12345", StoreStatus::Provisioning)
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let updated = server
        .metadata()
        .update_store(
            "abc12345",
            &StorePatch {
                db_ready: Some(true),
                ..StorePatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(updated.updated_at > inserted.updated_at);
}

#[tokio::test]
async fn update_unknown_store_returns_none() {
    let server = TestServer::new().await;
    let result = server
        .metadata()
        .update_store(
            "missing1",
            &StorePatch {
                db_ready: Some(true),
                ..StorePatch::default()
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn count_active_ignores_failed_and_deleted() {
    let server = TestServer::new().await;
    server.insert_store("ready001", StoreStatus::Ready).await;
    server
        .insert_store("pending1", StoreStatus::Provisioning)
        .await;
    server.insert_store("failed01", StoreStatus::Failed).await;
    server.insert_store("gone0001", StoreStatus::Deleted).await;

    assert_eq!(server.metadata().count_active_stores().await.unwrap(), 2);
}

#[tokio::test]
async fn soft_delete_stamps_deleted_at() {
    let server = TestServer::new().await;
    server.insert_store("abc12345", StoreStatus::Ready).await;

    let deleted = server
        .metadata()
        .soft_delete_store("abc12345")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(deleted.status, "deleted");
    assert!(deleted.deleted_at.is_some());

    assert!(server.metadata().list_stores().await.unwrap().is_empty());
}

#[tokio::test]
async fn inflight_listing_finds_interrupted_records() {
    let server = TestServer::new().await;
    server
        .insert_store("inflight", StoreStatus::Provisioning)
        .await;
    server.insert_store("ready001", StoreStatus::Ready).await;

    let inflight = server.metadata().list_inflight_stores().await.unwrap();
    assert_eq!(inflight.len(), 1);
    assert_eq!(inflight[0].store_id, "inflight");
}
