//! Application state shared across handlers.

use crate::audit::AuditLog;
use crate::provision::Provisioner;
use crate::ratelimit::RateLimitState;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use urumi_core::config::AppConfig;
use urumi_core::store::{ProvisionPhase, StoreStatus};
use urumi_kube::KubeGateway;
use urumi_metadata::MetadataStore;
use urumi_metadata::models::StorePatch;

/// Registry for in-flight provisioning workers.
///
/// A panicked worker would otherwise leave its record wedged in
/// `provisioning` until a restart. The registry tracks spawned tasks and
/// a watchdog marks panicked runs as failed, so the record becomes
/// actionable again within seconds.
pub struct WorkerRegistry {
    /// Map of store_id -> worker handle.
    tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    metadata: Arc<dyn MetadataStore>,
}

impl WorkerRegistry {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            metadata,
        }
    }

    /// Register a spawned worker.
    pub async fn register(&self, store_id: String, handle: JoinHandle<()>) {
        self.tasks.lock().await.insert(store_id, handle);
    }

    /// Spawn a watchdog that periodically reaps finished workers.
    /// The caller keeps the handle to prevent early termination.
    pub fn spawn_watchdog(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(10)).await;
                self.check_tasks().await;
            }
        })
    }

    /// Reap finished workers, marking panicked runs failed.
    pub async fn check_tasks(&self) {
        let mut finished = Vec::new();

        // Hold the lock only while collecting handles.
        {
            let mut tasks = self.tasks.lock().await;
            let done: Vec<String> = tasks
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(store_id, _)| store_id.clone())
                .collect();
            for store_id in done {
                if let Some(handle) = tasks.remove(&store_id) {
                    finished.push((store_id, handle));
                }
            }
        }

        for (store_id, handle) in finished {
            match handle.await {
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!(
                        store_id = %store_id,
                        panic = ?join_err,
                        "Provisioning worker panicked, marking store failed"
                    );
                    crate::metrics::PROVISION_WORKERS_ACTIVE.dec();
                    crate::metrics::STORES_PROVISION_FAILED.inc();
                    self.mark_panicked(&store_id).await;
                }
                Err(join_err) if join_err.is_cancelled() => {
                    tracing::warn!(store_id = %store_id, "Provisioning worker was cancelled");
                }
                Ok(_) => {
                    tracing::debug!(store_id = %store_id, "Provisioning worker finished");
                }
                Err(err) => {
                    tracing::error!(store_id = %store_id, error = ?err, "Provisioning worker failed");
                }
            }
        }
    }

    async fn mark_panicked(&self, store_id: &str) {
        let record = match self.metadata.get_store(store_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(store_id = %store_id, error = %err, "Failed to read panicked store");
                return;
            }
        };
        // Only a record whose status may still move to failed needs
        // rescuing; a worker that already drove its record to a terminal
        // state is left alone.
        let transition = StoreStatus::from_str(&record.status)
            .and_then(|status| status.transition(StoreStatus::Failed));
        if let Err(err) = transition {
            tracing::debug!(
                store_id = %store_id,
                status = %record.status,
                error = %err,
                "Panicked worker's record needs no rescue"
            );
            return;
        }
        let error_phase = record
            .phase
            .clone()
            .unwrap_or_else(|| ProvisionPhase::Namespace.as_str().to_string());
        let patch = StorePatch {
            status: Some(StoreStatus::Failed.as_str().to_string()),
            phase: Some(None),
            error_message: Some(Some("provisioning worker panicked".to_string())),
            error_phase: Some(Some(error_phase)),
            ..StorePatch::default()
        };
        if let Err(err) = self.metadata.update_store(store_id, &patch).await {
            tracing::error!(store_id = %store_id, error = %err, "Failed to mark panicked store");
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// State database.
    pub metadata: Arc<dyn MetadataStore>,
    /// Cluster gateway.
    pub gateway: Arc<dyn KubeGateway>,
    /// Audit log service.
    pub audit: AuditLog,
    /// Rate limiting state.
    pub rate_limit: RateLimitState,
    /// Orchestrator.
    pub provisioner: Arc<Provisioner>,
    /// Worker registry for panic recovery.
    pub workers: Arc<WorkerRegistry>,
    /// Shutdown signal. Sending true cancels in-flight workers
    /// cooperatively at their next suspension point.
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Create application state, validating configuration first.
    ///
    /// # Panics
    ///
    /// Panics when configuration validation fails with an error.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        gateway: Arc<dyn KubeGateway>,
    ) -> Self {
        match config.rate_limit.validate() {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("Configuration warning: {}", warning);
                }
            }
            Err(error) => panic!("Invalid rate limit configuration: {error}"),
        }
        if let Err(error) = config.provisioner.validate() {
            panic!("Invalid provisioner configuration: {error}");
        }

        let config = Arc::new(config);
        let audit = AuditLog::new(metadata.clone());
        let rate_limit = RateLimitState::new(&config.rate_limit);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let provisioner = Arc::new(Provisioner::new(
            config.clone(),
            metadata.clone(),
            gateway.clone(),
            audit.clone(),
            shutdown_rx,
        ));
        let workers = Arc::new(WorkerRegistry::new(metadata.clone()));

        Self {
            config,
            metadata,
            gateway,
            audit,
            rate_limit,
            provisioner,
            workers,
            shutdown: Arc::new(shutdown_tx),
        }
    }

    /// Cleanup interval for the rate limiter, if enabled.
    pub fn rate_limit_cleanup_interval(&self) -> Option<Duration> {
        if self.rate_limit.is_enabled() {
            Some(Duration::from_secs(
                self.config.rate_limit.cleanup_interval_secs.max(1),
            ))
        } else {
            None
        }
    }
}
