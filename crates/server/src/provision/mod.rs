//! The provisioning orchestrator: admission, the phased background
//! pipeline, failure cleanup, and the deletion flow.
//!
//! One worker per store drives `namespace -> database -> application ->
//! validation` under a shared deadline, checkpointing each phase into
//! the repository. Every gateway mutation is create-if-absent, so a
//! failed run can be retried from the beginning.

pub mod application;
pub mod database;
pub mod hooks;
pub mod tenancy;

use crate::audit::{AuditLog, actions};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use urumi_core::config::{AppConfig, ProvisionerConfig};
use urumi_core::deadline::{Deadline, DeadlineExceeded};
use urumi_core::store::{
    Engine, ProvisionPhase, StoreStatus, generate_store_id, namespace_for, validate_store_name,
};
use urumi_kube::{GatewayError, GatewayResult, KubeGateway};
use urumi_metadata::MetadataStore;
use urumi_metadata::models::{StorePatch, StoreRow};

/// Errors inside a provisioning or deletion run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("state error: {0}")]
    Metadata(#[from] urumi_metadata::MetadataError),

    #[error("deadline exceeded")]
    Deadline(#[from] DeadlineExceeded),

    /// A readiness wait ran out of its own budget.
    #[error("{0}")]
    PhaseTimeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Gateway(e) => ApiError::Gateway(e),
            ProvisionError::Metadata(e) => ApiError::Metadata(e),
            ProvisionError::Deadline(e) => ApiError::DeadlineExceeded(e),
            ProvisionError::PhaseTimeout(msg) => ApiError::Internal(msg),
            ProvisionError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

/// Hostname for a store.
pub fn store_host(config: &ProvisionerConfig, store_id: &str) -> String {
    format!("store-{store_id}.{}", config.store_domain)
}

/// Public URL for a store.
pub fn store_url(config: &ProvisionerConfig, store_id: &str) -> String {
    format!("http://{}", store_host(config, store_id))
}

/// Poll a replica count until it reaches `desired`, failing with a
/// phase-level timeout when `timeout` elapses first.
pub(crate) async fn wait_until_ready<F, Fut>(
    what: &str,
    timeout: Duration,
    poll_interval: Duration,
    desired: i32,
    mut poll: F,
) -> Result<(), ProvisionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<i32>>,
{
    let give_up = tokio::time::Instant::now() + timeout;
    loop {
        let ready = poll().await?;
        if ready >= desired {
            return Ok(());
        }
        if tokio::time::Instant::now() >= give_up {
            return Err(ProvisionError::PhaseTimeout(format!(
                "{what} not ready after {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// The orchestrator. Owns every store record mutation after admission;
/// the admission surface only inserts the initial row through it and
/// reads thereafter.
pub struct Provisioner {
    config: Arc<AppConfig>,
    metadata: Arc<dyn MetadataStore>,
    gateway: Arc<dyn KubeGateway>,
    audit: AuditLog,
    /// Flips to true on process shutdown; workers observe it at their
    /// next suspension point.
    shutdown: tokio::sync::watch::Receiver<bool>,
}

impl Provisioner {
    pub fn new(
        config: Arc<AppConfig>,
        metadata: Arc<dyn MetadataStore>,
        gateway: Arc<dyn KubeGateway>,
        audit: AuditLog,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            metadata,
            gateway,
            audit,
            shutdown,
        }
    }

    fn provisioner_config(&self) -> &ProvisionerConfig {
        &self.config.provisioner
    }

    /// Admission checks plus reservation. Returns the reserved record in
    /// `provisioning`/`namespace`; the caller spawns [`Provisioner::run`]
    /// to drive the pipeline.
    pub async fn admit_store(&self, name: &str, engine: &str) -> ApiResult<StoreRow> {
        validate_store_name(name).map_err(|e| ApiError::Validation(e.to_string()))?;
        let engine =
            Engine::from_str(engine).map_err(|e| ApiError::Validation(e.to_string()))?;
        if !engine.is_supported() {
            return Err(ApiError::Validation(format!(
                "engine '{engine}' is reserved and not yet available"
            )));
        }

        // Read-then-insert; a concurrent admission race can briefly admit
        // one extra store. A strict cap needs a transactional count-and-insert.
        let active = self.metadata.count_active_stores().await?;
        let cap = self.provisioner_config().max_active_stores;
        if active >= cap {
            return Err(ApiError::Conflict(format!(
                "active store limit reached ({cap}); delete a store first"
            )));
        }

        let store_id = generate_store_id();
        let now = OffsetDateTime::now_utc();
        let record = StoreRow {
            namespace: namespace_for(&store_id),
            store_id: store_id.clone(),
            name: name.to_string(),
            engine: engine.as_str().to_string(),
            status: StoreStatus::Provisioning.as_str().to_string(),
            phase: Some(ProvisionPhase::Namespace.as_str().to_string()),
            url: None,
            admin_url: None,
            db_ready: false,
            app_ready: false,
            error_message: None,
            error_phase: None,
            created_at: now,
            updated_at: now,
            ready_at: None,
            deleted_at: None,
            provisioning_duration_ms: None,
        };
        self.metadata.create_store(&record).await?;

        self.audit
            .record(urumi_metadata::models::NewAuditEntry {
                action: actions::STORE_CREATE_STARTED.to_string(),
                store_id: Some(store_id),
                store_name: Some(record.name.clone()),
                engine: Some(record.engine.clone()),
                ..Default::default()
            })
            .await;

        Ok(record)
    }

    /// Worker entry point: drive the pipeline for one reserved record.
    ///
    /// A shutdown signal cancels the run at its next suspension point;
    /// the record keeps its last committed checkpoint and is reaped by
    /// [`Provisioner::recover_orphaned_runs`] at the next startup.
    pub async fn run(self: Arc<Self>, record: StoreRow) {
        metrics::PROVISION_WORKERS_ACTIVE.inc();
        let deadline = Deadline::after(self.provisioner_config().provision_deadline());
        let mut shutdown = self.shutdown.clone();
        let outcome = tokio::select! {
            result = self.drive(&record, deadline) => Some(result),
            _ = shutdown.wait_for(|stop| *stop) => None,
        };
        metrics::PROVISION_WORKERS_ACTIVE.dec();

        let Some(result) = outcome else {
            tracing::warn!(
                store_id = %record.store_id,
                "Shutdown during provisioning; record keeps its last committed checkpoint"
            );
            return;
        };

        match result {
            Ok(duration_ms) => {
                metrics::STORES_PROVISIONED.inc();
                metrics::PROVISION_DURATION.observe(duration_ms as f64 / 1000.0);
                tracing::info!(
                    store_id = %record.store_id,
                    duration_ms,
                    "Store provisioned"
                );
                self.audit
                    .record(urumi_metadata::models::NewAuditEntry {
                        action: actions::STORE_CREATE_SUCCEEDED.to_string(),
                        store_id: Some(record.store_id.clone()),
                        store_name: Some(record.name.clone()),
                        engine: Some(record.engine.clone()),
                        duration_ms: Some(duration_ms),
                        ..Default::default()
                    })
                    .await;
            }
            Err(err) => {
                metrics::STORES_PROVISION_FAILED.inc();
                self.fail_store(&record, &err).await;
            }
        }
    }

    /// The four-phase pipeline. Returns the provisioning duration in
    /// milliseconds on success.
    async fn drive(&self, record: &StoreRow, deadline: Deadline) -> Result<i64, ProvisionError> {
        let config = self.provisioner_config();
        let gateway = self.gateway.as_ref();

        // Phase 1: namespace and tenancy isolation.
        deadline.wrap(tenancy::build(gateway, record)).await?;
        self.checkpoint(
            &record.store_id,
            StorePatch {
                phase: Some(Some(ProvisionPhase::Database.as_str().to_string())),
                ..StorePatch::default()
            },
        )
        .await?;

        // Phase 2: database workload.
        let db = deadline
            .wrap(database::deploy(gateway, config, record))
            .await?;
        self.checkpoint(
            &record.store_id,
            StorePatch {
                db_ready: Some(true),
                phase: Some(Some(ProvisionPhase::Application.as_str().to_string())),
                ..StorePatch::default()
            },
        )
        .await?;

        // Phase 3: application workload.
        deadline
            .wrap(application::deploy(gateway, config, record, &db))
            .await?;
        self.checkpoint(
            &record.store_id,
            StorePatch {
                app_ready: Some(true),
                phase: Some(Some(ProvisionPhase::Validation.as_str().to_string())),
                ..StorePatch::default()
            },
        )
        .await?;

        // Phase 4: best-effort post-install. The store goes ready
        // regardless of the hook's outcome.
        if let Err(err) = deadline
            .wrap(hooks::run_post_install(gateway, config, record))
            .await
        {
            tracing::warn!(
                store_id = %record.store_id,
                error = %err,
                "Post-install hook did not complete"
            );
        }

        self.finish(record).await
    }

    /// Transition the record to ready with its URLs and timings.
    async fn finish(&self, record: &StoreRow) -> Result<i64, ProvisionError> {
        let config = self.provisioner_config();
        let url = store_url(config, &record.store_id);
        let admin_url = format!("{url}/wp-admin");

        let current = self
            .metadata
            .get_store(&record.store_id)
            .await?
            .ok_or_else(|| {
                ProvisionError::Internal(format!("store {} disappeared", record.store_id))
            })?;
        let status = StoreStatus::from_str(&current.status)
            .map_err(|e| ProvisionError::Internal(e.to_string()))?;
        status
            .transition(StoreStatus::Ready)
            .map_err(|e| ProvisionError::Internal(e.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let duration_ms = ((now - record.created_at).whole_milliseconds() as i64).max(1);
        self.checkpoint(
            &record.store_id,
            StorePatch {
                status: Some(StoreStatus::Ready.as_str().to_string()),
                phase: Some(None),
                url: Some(url),
                admin_url: Some(admin_url),
                ready_at: Some(now),
                provisioning_duration_ms: Some(duration_ms),
                ..StorePatch::default()
            },
        )
        .await?;
        Ok(duration_ms)
    }

    /// Commit one durable state change at a phase boundary.
    async fn checkpoint(&self, store_id: &str, patch: StorePatch) -> Result<(), ProvisionError> {
        self.metadata
            .update_store(store_id, &patch)
            .await?
            .ok_or_else(|| ProvisionError::Internal(format!("store {store_id} disappeared")))?;
        Ok(())
    }

    /// Record the failure and cascade-clean the namespace.
    async fn fail_store(&self, record: &StoreRow, err: &ProvisionError) {
        let current = match self.metadata.get_store(&record.store_id).await {
            Ok(Some(current)) => Some(current),
            Ok(None) => {
                tracing::error!(store_id = %record.store_id, "Failing store disappeared");
                None
            }
            Err(read_err) => {
                tracing::error!(
                    store_id = %record.store_id,
                    error = %read_err,
                    "Failed to read failing store"
                );
                None
            }
        };
        let error_phase = current
            .as_ref()
            .and_then(|c| c.phase.clone())
            .unwrap_or_else(|| ProvisionPhase::Namespace.as_str().to_string());

        tracing::error!(
            store_id = %record.store_id,
            phase = %error_phase,
            error = %err,
            "Provisioning failed"
        );

        if let Some(current) = current {
            match StoreStatus::from_str(&current.status)
                .and_then(|status| status.transition(StoreStatus::Failed))
            {
                Ok(_) => {
                    let patch = StorePatch {
                        status: Some(StoreStatus::Failed.as_str().to_string()),
                        phase: Some(None),
                        error_message: Some(Some(err.to_string())),
                        error_phase: Some(Some(error_phase.clone())),
                        ..StorePatch::default()
                    };
                    if let Err(update_err) =
                        self.metadata.update_store(&record.store_id, &patch).await
                    {
                        tracing::error!(
                            store_id = %record.store_id,
                            error = %update_err,
                            "Failed to record provisioning failure"
                        );
                    }
                }
                Err(transition_err) => {
                    tracing::error!(
                        store_id = %record.store_id,
                        status = %current.status,
                        error = %transition_err,
                        "Refusing to mark store failed from its current status"
                    );
                }
            }
        }

        self.audit
            .record(urumi_metadata::models::NewAuditEntry {
                action: actions::STORE_CREATE_FAILED.to_string(),
                store_id: Some(record.store_id.clone()),
                store_name: Some(record.name.clone()),
                engine: Some(record.engine.clone()),
                details: Some(serde_json::json!({
                    "error": err.to_string(),
                    "phase": error_phase,
                })),
                ..Default::default()
            })
            .await;

        // Best-effort cascade cleanup; the record stays failed even when
        // this cannot complete.
        if let Err(cleanup_err) = self.gateway.delete_namespace(&record.namespace).await {
            tracing::warn!(
                namespace = %record.namespace,
                error = %cleanup_err,
                "Cleanup of failed store namespace did not complete"
            );
        }
    }

    /// Delete a store: remove its whole namespace, wait for it to be
    /// gone, and soft-delete the record. Idempotent for deleted stores.
    pub async fn delete_store(&self, store_id: &str) -> ApiResult<StoreRow> {
        let record = self
            .metadata
            .get_store(store_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("store {store_id} not found")))?;
        let status = StoreStatus::from_str(&record.status)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        if status == StoreStatus::Deleted {
            return Ok(record);
        }
        status.transition(StoreStatus::Deleting).map_err(|_| {
            ApiError::Conflict(format!(
                "store {store_id} cannot be deleted while {status}"
            ))
        })?;

        self.metadata
            .update_store(
                store_id,
                &StorePatch {
                    status: Some(StoreStatus::Deleting.as_str().to_string()),
                    error_message: Some(None),
                    error_phase: Some(None),
                    ..StorePatch::default()
                },
            )
            .await?;

        match self.tear_down_namespace(&record.namespace).await {
            Ok(()) => {
                let deleted = self
                    .metadata
                    .soft_delete_store(store_id)
                    .await?
                    .ok_or_else(|| {
                        ApiError::Internal(format!("store {store_id} disappeared"))
                    })?;
                metrics::STORES_DELETED.inc();
                self.audit
                    .record(urumi_metadata::models::NewAuditEntry {
                        action: actions::STORE_DELETE_SUCCEEDED.to_string(),
                        store_id: Some(record.store_id.clone()),
                        store_name: Some(record.name.clone()),
                        engine: Some(record.engine.clone()),
                        ..Default::default()
                    })
                    .await;
                tracing::info!(store_id = %store_id, "Store deleted");
                Ok(deleted)
            }
            Err(err) => {
                let message = format!("Deletion failed: {err}");
                tracing::error!(store_id = %store_id, error = %err, "Deletion failed");
                if let Err(update_err) = self
                    .metadata
                    .update_store(
                        store_id,
                        &StorePatch {
                            status: Some(StoreStatus::Failed.as_str().to_string()),
                            error_message: Some(Some(message.clone())),
                            error_phase: Some(Some("deletion".to_string())),
                            ..StorePatch::default()
                        },
                    )
                    .await
                {
                    tracing::error!(
                        store_id = %store_id,
                        error = %update_err,
                        "Failed to record deletion failure"
                    );
                }
                self.audit
                    .record(urumi_metadata::models::NewAuditEntry {
                        action: actions::STORE_DELETE_FAILED.to_string(),
                        store_id: Some(record.store_id.clone()),
                        store_name: Some(record.name.clone()),
                        engine: Some(record.engine.clone()),
                        details: Some(serde_json::json!({ "error": err.to_string() })),
                        ..Default::default()
                    })
                    .await;
                Err(err.into())
            }
        }
    }

    /// Foreground-delete the namespace and poll until it is gone.
    async fn tear_down_namespace(&self, namespace: &str) -> Result<(), ProvisionError> {
        let config = self.provisioner_config();
        self.gateway.delete_namespace(namespace).await?;

        let give_up = tokio::time::Instant::now() + config.delete_timeout();
        loop {
            if self.gateway.get_namespace(namespace).await?.is_none() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= give_up {
                return Err(ProvisionError::PhaseTimeout(format!(
                    "namespace {namespace} still terminating after {}s",
                    config.delete_timeout().as_secs()
                )));
            }
            tokio::time::sleep(config.readiness_poll_interval()).await;
        }
    }

    /// Startup recovery: records left in flight by a previous process are
    /// marked failed and their namespaces cleaned up best-effort. Returns
    /// the number of recovered records.
    pub async fn recover_orphaned_runs(&self) -> Result<usize, ProvisionError> {
        let inflight = self.metadata.list_inflight_stores().await?;
        if inflight.is_empty() {
            return Ok(0);
        }

        tracing::warn!(
            count = inflight.len(),
            "Found stores left in flight by a previous server instance"
        );

        let mut recovered = 0;
        for record in inflight {
            let previous_status = record.status.clone();
            if let Err(err) = StoreStatus::from_str(&record.status)
                .and_then(|status| status.transition(StoreStatus::Failed))
            {
                tracing::error!(
                    store_id = %record.store_id,
                    status = %record.status,
                    error = %err,
                    "Skipping orphaned store that cannot transition to failed"
                );
                continue;
            }
            let error_phase = record
                .phase
                .clone()
                .unwrap_or_else(|| "startup".to_string());
            let patch = StorePatch {
                status: Some(StoreStatus::Failed.as_str().to_string()),
                phase: Some(None),
                error_message: Some(Some(
                    "provisioning interrupted by server restart".to_string(),
                )),
                error_phase: Some(Some(error_phase)),
                ..StorePatch::default()
            };
            if let Err(err) = self.metadata.update_store(&record.store_id, &patch).await {
                tracing::error!(
                    store_id = %record.store_id,
                    error = %err,
                    "Failed to mark orphaned store"
                );
                continue;
            }
            recovered += 1;

            self.audit
                .record(urumi_metadata::models::NewAuditEntry {
                    action: actions::STORE_RECOVERED.to_string(),
                    store_id: Some(record.store_id.clone()),
                    store_name: Some(record.name.clone()),
                    engine: Some(record.engine.clone()),
                    details: Some(serde_json::json!({ "previousStatus": previous_status })),
                    ..Default::default()
                })
                .await;

            if let Err(err) = self.gateway.delete_namespace(&record.namespace).await {
                tracing::warn!(
                    namespace = %record.namespace,
                    error = %err,
                    "Cleanup of orphaned namespace did not complete"
                );
            }
        }
        Ok(recovered)
    }
}
