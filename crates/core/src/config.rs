//! Configuration types shared across crates.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Deployment environment tag ("development", "production").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Default log filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum request body size for write endpoints, in bytes.
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_body_limit_bytes() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: default_environment(),
            log_level: default_log_level(),
            body_limit_bytes: default_body_limit_bytes(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// State database configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// SQLite database (development and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/urumi.db"),
        }
    }
}

/// Cluster connection configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ClusterConfig {
    /// In-cluster when the service account env vars are present,
    /// otherwise the default kubeconfig.
    #[default]
    Auto,
    /// Force the in-cluster service account.
    InCluster,
    /// A kubeconfig file.
    Kubeconfig {
        /// Path to the kubeconfig; defaults to ~/.kube/config.
        path: Option<PathBuf>,
        /// Context to select; defaults to current-context.
        context: Option<String>,
    },
    /// Explicit API server coordinates (primarily for tests).
    Explicit {
        /// API server base URL.
        server: String,
        /// Bearer token, if the server requires one.
        token: Option<String>,
        /// PEM bundle for the cluster CA.
        ca_cert_path: Option<PathBuf>,
        /// Skip TLS verification. Never use outside local development.
        #[serde(default)]
        insecure_skip_tls_verify: bool,
    },
}

/// Retry settings for gateway calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Build the runtime policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

/// Provisioner configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Domain under which store hostnames are minted
    /// (store URL is `http://store-<id>.<store_domain>`).
    #[serde(default = "default_store_domain")]
    pub store_domain: String,
    /// Ingress class for tenant ingresses.
    #[serde(default = "default_ingress_class")]
    pub ingress_class: String,
    /// Hard cap on stores whose status is neither failed nor deleted.
    #[serde(default = "default_max_active_stores")]
    pub max_active_stores: u32,
    /// End-to-end budget for one provisioning run, in seconds.
    #[serde(default = "default_provision_deadline_secs")]
    pub provision_deadline_secs: u64,
    /// Readiness budget for the database workload, in seconds.
    #[serde(default = "default_database_ready_timeout_secs")]
    pub database_ready_timeout_secs: u64,
    /// Readiness budget for the application workload, in seconds.
    #[serde(default = "default_application_ready_timeout_secs")]
    pub application_ready_timeout_secs: u64,
    /// How long to wait for a deleted namespace to go away, in seconds.
    #[serde(default = "default_delete_timeout_secs")]
    pub delete_timeout_secs: u64,
    /// Cadence of readiness and deletion polls, in milliseconds.
    #[serde(default = "default_readiness_poll_interval_ms")]
    pub readiness_poll_interval_ms: u64,
    /// PVC size for the tenant database.
    #[serde(default = "default_database_storage")]
    pub database_storage: String,
    /// PVC size for application content.
    #[serde(default = "default_application_storage")]
    pub application_storage: String,
    /// Per-command budget for post-install exec commands, in seconds.
    #[serde(default = "default_exec_command_timeout_secs")]
    pub exec_command_timeout_secs: u64,
    /// Retry settings for gateway calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_store_domain() -> String {
    "stores.local".to_string()
}

fn default_ingress_class() -> String {
    "nginx".to_string()
}

fn default_max_active_stores() -> u32 {
    10
}

fn default_provision_deadline_secs() -> u64 {
    300
}

fn default_database_ready_timeout_secs() -> u64 {
    90
}

fn default_application_ready_timeout_secs() -> u64 {
    180
}

fn default_delete_timeout_secs() -> u64 {
    60
}

fn default_readiness_poll_interval_ms() -> u64 {
    2000
}

fn default_database_storage() -> String {
    "2Gi".to_string()
}

fn default_application_storage() -> String {
    "3Gi".to_string()
}

fn default_exec_command_timeout_secs() -> u64 {
    30
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            store_domain: default_store_domain(),
            ingress_class: default_ingress_class(),
            max_active_stores: default_max_active_stores(),
            provision_deadline_secs: default_provision_deadline_secs(),
            database_ready_timeout_secs: default_database_ready_timeout_secs(),
            application_ready_timeout_secs: default_application_ready_timeout_secs(),
            delete_timeout_secs: default_delete_timeout_secs(),
            readiness_poll_interval_ms: default_readiness_poll_interval_ms(),
            database_storage: default_database_storage(),
            application_storage: default_application_storage(),
            exec_command_timeout_secs: default_exec_command_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl ProvisionerConfig {
    pub fn provision_deadline(&self) -> Duration {
        Duration::from_secs(self.provision_deadline_secs)
    }

    pub fn database_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.database_ready_timeout_secs)
    }

    pub fn application_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.application_ready_timeout_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    pub fn exec_command_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_command_timeout_secs)
    }

    /// Validate provisioner configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_active_stores == 0 {
            return Err("provisioner.max_active_stores must be at least 1".to_string());
        }
        if self.readiness_poll_interval_ms == 0 {
            return Err(
                "provisioner.readiness_poll_interval_ms cannot be 0; this would spin the \
                 readiness loop without yielding"
                    .to_string(),
            );
        }
        Ok(())
    }
}

/// Rate limiting configuration. All windows are fixed: a counter per
/// (scope, client IP) that resets when the window rolls over.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Store creations allowed per IP per window.
    #[serde(default = "default_create_limit")]
    pub create_limit: u32,
    /// Window for store creations, in seconds.
    #[serde(default = "default_create_window_secs")]
    pub create_window_secs: u64,
    /// Store deletions allowed per IP per window.
    #[serde(default = "default_delete_limit")]
    pub delete_limit: u32,
    /// Window for store deletions, in seconds.
    #[serde(default = "default_delete_window_secs")]
    pub delete_window_secs: u64,
    /// Write requests allowed per IP per global window (reads and health
    /// checks are exempt).
    #[serde(default = "default_global_write_limit")]
    pub global_write_limit: u32,
    /// Global write window, in seconds.
    #[serde(default = "default_global_write_window_secs")]
    pub global_write_window_secs: u64,
    /// Trusted proxy IPs/CIDRs for X-Forwarded-For extraction. The
    /// platform sits behind exactly one ingress hop, so the default
    /// trusts forwarded headers from anywhere; lock this down when the
    /// server is directly reachable.
    #[serde(default = "default_trusted_proxies")]
    pub trusted_proxies: Vec<String>,
    /// Maximum tracked (scope, IP) windows before rejecting new clients.
    #[serde(default = "default_rate_limit_max_entries")]
    pub max_entries: u32,
    /// Interval between sweeps of expired windows, in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_create_limit() -> u32 {
    5
}

fn default_create_window_secs() -> u64 {
    600
}

fn default_delete_limit() -> u32 {
    10
}

fn default_delete_window_secs() -> u64 {
    600
}

fn default_global_write_limit() -> u32 {
    100
}

fn default_global_write_window_secs() -> u64 {
    900
}

fn default_trusted_proxies() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_rate_limit_max_entries() -> u32 {
    100_000
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            create_limit: default_create_limit(),
            create_window_secs: default_create_window_secs(),
            delete_limit: default_delete_limit(),
            delete_window_secs: default_delete_window_secs(),
            global_write_limit: default_global_write_limit(),
            global_write_window_secs: default_global_write_window_secs(),
            trusted_proxies: default_trusted_proxies(),
            max_entries: default_rate_limit_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Validate rate limit configuration. Returns warnings for insecure
    /// but allowed settings and errors for unsafe ones.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if !self.enabled {
            return Ok(warnings);
        }

        if self.cleanup_interval_secs == 0 {
            return Err("rate_limit.cleanup_interval_secs cannot be 0. \
                 This would cause a panic when creating the cleanup timer."
                .to_string());
        }

        if self.create_window_secs == 0 || self.delete_window_secs == 0 {
            return Err("rate limit windows cannot be 0 seconds".to_string());
        }

        if self.trusted_proxies.len() == 1 && self.trusted_proxies[0] == "*" {
            warnings.push(
                "rate_limit.trusted_proxies=['*'] trusts X-Forwarded-For from any peer. \
                 This matches the expected single-ingress deployment; restrict it if the \
                 server is reachable without a proxy."
                    .to_string(),
            );
        }

        Ok(warnings)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// State database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cluster connection configuration.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Provisioner configuration.
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** SQLite state, no rate limiting, and fast
    /// retry/poll timings so readiness loops do not stall the suite.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            cluster: ClusterConfig::Explicit {
                server: "http://127.0.0.1:1".to_string(),
                token: None,
                ca_cert_path: None,
                insecure_skip_tls_verify: false,
            },
            provisioner: ProvisionerConfig {
                readiness_poll_interval_ms: 10,
                retry: RetryConfig {
                    initial_delay_ms: 1,
                    max_delay_ms: 5,
                    jitter: false,
                    ..RetryConfig::default()
                },
                ..ProvisionerConfig::default()
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = AppConfig::default();
        assert_eq!(config.provisioner.max_active_stores, 10);
        assert_eq!(config.provisioner.provision_deadline_secs, 300);
        assert_eq!(config.provisioner.database_ready_timeout_secs, 90);
        assert_eq!(config.provisioner.application_ready_timeout_secs, 180);
        assert_eq!(config.rate_limit.create_limit, 5);
        assert_eq!(config.rate_limit.delete_limit, 10);
        assert_eq!(config.rate_limit.global_write_limit, 100);
    }

    #[test]
    fn deserialize_without_fields_uses_defaults() {
        let config: ProvisionerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.store_domain, "stores.local");
        assert_eq!(config.delete_timeout_secs, 60);
    }

    #[test]
    fn cluster_config_defaults_to_auto() {
        let config: ClusterConfig = serde_json::from_str(r#"{"mode":"auto"}"#).unwrap();
        assert!(matches!(config, ClusterConfig::Auto));
    }

    #[test]
    fn provisioner_validate_rejects_zero_poll_interval() {
        let config = ProvisionerConfig {
            readiness_poll_interval_ms: 0,
            ..ProvisionerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rate_limit_validate_rejects_zero_cleanup_interval() {
        let config = RateLimitConfig {
            cleanup_interval_secs: 0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rate_limit_validate_warns_on_wildcard_proxies() {
        let warnings = RateLimitConfig::default().validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn retry_config_to_policy() {
        let policy = RetryConfig::default().to_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }
}
