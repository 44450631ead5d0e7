//! Server test utilities.

use super::gateway::MockGateway;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use urumi_core::config::AppConfig;
use urumi_core::store::StoreStatus;
use urumi_kube::KubeGateway;
use urumi_metadata::models::StoreRow;
use urumi_metadata::{MetadataStore, SqliteStore};
use urumi_server::{AppState, create_router};

/// A test server with SQLite state and a mock cluster gateway.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with test-friendly defaults: sub-second
    /// readiness budgets and a fast poll cadence.
    pub async fn new() -> Self {
        Self::build(MockGateway::new(), |_| {}).await
    }

    /// Create a test server with a preconfigured mock gateway.
    pub async fn with_gateway(gateway: Arc<MockGateway>) -> Self {
        Self::build(gateway, |_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(MockGateway::new(), modifier).await
    }

    /// Create a test server with both a gateway and config changes.
    pub async fn with_gateway_and_config<F>(gateway: Arc<MockGateway>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(gateway, modifier).await
    }

    async fn build<F>(gateway: Arc<MockGateway>, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("urumi.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create state database"),
        );

        let mut config = AppConfig::for_testing();
        config.provisioner.database_ready_timeout_secs = 1;
        config.provisioner.application_ready_timeout_secs = 1;
        config.provisioner.delete_timeout_secs = 1;
        config.provisioner.provision_deadline_secs = 10;
        modifier(&mut config);

        let cluster: Arc<dyn KubeGateway> = gateway.clone();
        let state = AppState::new(config, metadata, cluster);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Poll the repository until the record reaches `status` or the
    /// timeout elapses.
    pub async fn wait_for_status(&self, store_id: &str, status: StoreStatus) -> StoreRow {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let record = self
                .metadata()
                .get_store(store_id)
                .await
                .expect("store lookup failed");
            if let Some(record) = record
                && record.status == status.as_str()
            {
                return record;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("store {store_id} did not reach {status} in time");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Insert a bare record directly, bypassing admission.
    pub async fn insert_store(&self, store_id: &str, status: StoreStatus) -> StoreRow {
        let now = time::OffsetDateTime::now_utc();
        let provisioning = status == StoreStatus::Provisioning;
        let record = StoreRow {
            store_id: store_id.to_string(),
            name: format!("store-{store_id}-name"),
            namespace: urumi_core::store::namespace_for(store_id),
            engine: "woocommerce".to_string(),
            status: status.as_str().to_string(),
            phase: provisioning.then(|| "database".to_string()),
            url: None,
            admin_url: None,
            db_ready: false,
            app_ready: false,
            error_message: (status == StoreStatus::Failed).then(|| "boom".to_string()),
            error_phase: (status == StoreStatus::Failed).then(|| "database".to_string()),
            created_at: now,
            updated_at: now,
            ready_at: None,
            deleted_at: None,
            provisioning_duration_ms: None,
        };
        self.metadata()
            .create_store(&record)
            .await
            .expect("failed to insert store");
        record
    }
}

/// Assert the record-level invariants that must hold for every store.
#[allow(dead_code)]
pub fn assert_store_invariants(record: &StoreRow) {
    assert_eq!(
        record.namespace,
        format!("store-{}", record.store_id),
        "namespace must be derived from the id"
    );
    let status = StoreStatus::from_str(&record.status).expect("status must parse");
    assert_eq!(
        record.phase.is_some(),
        status == StoreStatus::Provisioning,
        "phase must be present exactly while provisioning"
    );
    let ready = status == StoreStatus::Ready;
    assert_eq!(record.url.is_some(), ready, "url is set exactly when ready");
    assert_eq!(
        record.admin_url.is_some(),
        ready,
        "adminUrl is set exactly when ready"
    );
    assert_eq!(
        record.ready_at.is_some(),
        ready,
        "readyAt is set exactly when ready"
    );
    let failed = status == StoreStatus::Failed;
    assert_eq!(
        record.error_message.is_some(),
        failed,
        "errorMessage is set exactly when failed"
    );
    assert_eq!(
        record.error_phase.is_some(),
        failed,
        "errorPhase is set exactly when failed"
    );
}

/// Send a JSON request through the router and decode the response.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    json_request_from(router, method, uri, body, None).await
}

/// Same, with an explicit client IP via X-Forwarded-For.
#[allow(dead_code)]
pub async fn json_request_from(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    source_ip: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(ip) = source_ip {
        builder = builder.header("X-Forwarded-For", ip);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, body_json)
}
