//! Database workload: a single-replica MariaDB stateful set with
//! generated credentials, a headless service, and a readiness wait.

use super::{ProvisionError, tenancy, wait_until_ready};
use std::collections::BTreeMap;
use urumi_core::config::ProvisionerConfig;
use urumi_core::secrets::generate_password;
use urumi_kube::KubeGateway;
use urumi_kube::objects::{
    ContainerPort, ContainerSpec, EnvVar, Probe, ProbeAction, ResourceAmounts, Resources,
    SecretSpec, ServicePort, ServiceSpec, StatefulSetSpec, VolumeMount,
};
use urumi_metadata::models::StoreRow;

/// Well-known names inside the tenant namespace.
pub const DB_SERVICE: &str = "db";
pub const DB_SECRET: &str = "db-credentials";
pub const DB_NAME: &str = "storefront";
pub const DB_USER: &str = "urumi";
pub const DB_PORT: u16 = 3306;

const DB_IMAGE: &str = "mariadb:11.4";

/// Connection descriptor handed to the application phase. Passwords stay
/// in the cluster secret and are referenced by key.
#[derive(Debug, Clone)]
pub struct DbConnection {
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub user: String,
    pub secret_name: String,
}

/// Deploy the database workload and wait until it is ready.
pub async fn deploy(
    gateway: &dyn KubeGateway,
    config: &ProvisionerConfig,
    record: &StoreRow,
) -> Result<DbConnection, ProvisionError> {
    let namespace = &record.namespace;
    let mut labels = tenancy::standard_labels(record);
    labels.insert("app".to_string(), DB_SERVICE.to_string());

    gateway
        .ensure_secret(
            namespace,
            &SecretSpec {
                name: DB_SECRET.to_string(),
                labels: labels.clone(),
                string_data: BTreeMap::from([
                    ("root-password".to_string(), generate_password()),
                    ("db-user".to_string(), DB_USER.to_string()),
                    ("db-password".to_string(), generate_password()),
                    ("db-name".to_string(), DB_NAME.to_string()),
                ]),
            },
        )
        .await?;

    gateway
        .ensure_service(
            namespace,
            &ServiceSpec {
                name: DB_SERVICE.to_string(),
                labels: labels.clone(),
                selector: BTreeMap::from([("app".to_string(), DB_SERVICE.to_string())]),
                ports: vec![ServicePort {
                    name: "mysql".to_string(),
                    port: DB_PORT as i32,
                    target_port: DB_PORT as i32,
                }],
                headless: true,
            },
        )
        .await?;

    gateway
        .ensure_stateful_set(namespace, &stateful_set_spec(config, labels))
        .await?;

    wait_until_ready(
        "database workload",
        config.database_ready_timeout(),
        config.readiness_poll_interval(),
        1,
        || gateway.stateful_set_ready_replicas(namespace, DB_SERVICE),
    )
    .await?;

    Ok(DbConnection {
        host: format!("{DB_SERVICE}.{namespace}.svc.cluster.local"),
        port: DB_PORT,
        db_name: DB_NAME.to_string(),
        user: DB_USER.to_string(),
        secret_name: DB_SECRET.to_string(),
    })
}

fn stateful_set_spec(
    config: &ProvisionerConfig,
    labels: BTreeMap<String, String>,
) -> StatefulSetSpec {
    // mysqladmin ping answers "alive" once the server accepts
    // connections, no credentials needed.
    let health_probe = |initial_delay_secs| Probe {
        action: ProbeAction::Exec {
            command: vec![
                "mysqladmin".to_string(),
                "ping".to_string(),
                "-h".to_string(),
                "127.0.0.1".to_string(),
            ],
        },
        initial_delay_secs,
        period_secs: 10,
        timeout_secs: 5,
        failure_threshold: 3,
    };

    StatefulSetSpec {
        name: DB_SERVICE.to_string(),
        labels,
        replicas: 1,
        service_name: DB_SERVICE.to_string(),
        container: ContainerSpec {
            name: "mariadb".to_string(),
            image: DB_IMAGE.to_string(),
            ports: vec![ContainerPort {
                name: "mysql".to_string(),
                port: DB_PORT as i32,
            }],
            env: vec![
                EnvVar::secret_key("MARIADB_ROOT_PASSWORD", DB_SECRET, "root-password"),
                EnvVar::secret_key("MARIADB_DATABASE", DB_SECRET, "db-name"),
                EnvVar::secret_key("MARIADB_USER", DB_SECRET, "db-user"),
                EnvVar::secret_key("MARIADB_PASSWORD", DB_SECRET, "db-password"),
            ],
            resources: Resources {
                requests: ResourceAmounts::new("100m", "256Mi"),
                limits: ResourceAmounts::new("500m", "512Mi"),
            },
            liveness_probe: Some(health_probe(30)),
            readiness_probe: Some(health_probe(10)),
            volume_mounts: vec![VolumeMount {
                name: "data".to_string(),
                mount_path: "/var/lib/mysql".to_string(),
            }],
        },
        volume_claim_name: "data".to_string(),
        volume_claim_storage: config.database_storage.clone(),
    }
}
