//! Application workload: WordPress + WooCommerce behind a ClusterIP
//! service and an ingress rule for the store's hostname.

use super::database::DbConnection;
use super::{ProvisionError, store_host, store_url, tenancy, wait_until_ready};
use std::collections::BTreeMap;
use urumi_core::config::ProvisionerConfig;
use urumi_core::secrets::generate_password;
use urumi_kube::KubeGateway;
use urumi_kube::objects::{
    ContainerPort, ContainerSpec, DeploymentSpec, EnvVar, IngressSpec, Probe, ProbeAction,
    PvcSpec, PvcVolume, ResourceAmounts, Resources, SecretSpec, ServicePort, ServiceSpec,
    VolumeMount,
};
use urumi_metadata::models::StoreRow;

/// Well-known names inside the tenant namespace.
pub const APP_NAME: &str = "storefront";
pub const APP_SECRET: &str = "admin-credentials";
pub const APP_CONTENT_PVC: &str = "storefront-content";
pub const APP_HTTP_PORT: i32 = 8080;

const APP_IMAGE: &str = "wordpress:6.5-apache";

/// Deploy the application workload and wait until it is ready.
pub async fn deploy(
    gateway: &dyn KubeGateway,
    config: &ProvisionerConfig,
    record: &StoreRow,
    db: &DbConnection,
) -> Result<(), ProvisionError> {
    let namespace = &record.namespace;
    let mut labels = tenancy::standard_labels(record);
    labels.insert("app".to_string(), APP_NAME.to_string());

    gateway
        .ensure_secret(
            namespace,
            &SecretSpec {
                name: APP_SECRET.to_string(),
                labels: labels.clone(),
                string_data: BTreeMap::from([
                    ("admin-user".to_string(), "admin".to_string()),
                    ("admin-password".to_string(), generate_password()),
                ]),
            },
        )
        .await?;

    gateway
        .ensure_pvc(
            namespace,
            &PvcSpec {
                name: APP_CONTENT_PVC.to_string(),
                labels: labels.clone(),
                storage: config.application_storage.clone(),
            },
        )
        .await?;

    gateway
        .ensure_deployment(namespace, &deployment_spec(config, record, db, labels.clone()))
        .await?;

    gateway
        .ensure_service(
            namespace,
            &ServiceSpec {
                name: APP_NAME.to_string(),
                labels: labels.clone(),
                selector: BTreeMap::from([("app".to_string(), APP_NAME.to_string())]),
                ports: vec![ServicePort {
                    name: "http".to_string(),
                    port: 80,
                    target_port: APP_HTTP_PORT,
                }],
                headless: false,
            },
        )
        .await?;

    gateway
        .ensure_ingress(namespace, &ingress_spec(config, record, labels))
        .await?;

    wait_until_ready(
        "application workload",
        config.application_ready_timeout(),
        config.readiness_poll_interval(),
        1,
        || gateway.deployment_ready_replicas(namespace, APP_NAME),
    )
    .await?;

    Ok(())
}

fn deployment_spec(
    config: &ProvisionerConfig,
    record: &StoreRow,
    db: &DbConnection,
    labels: BTreeMap<String, String>,
) -> DeploymentSpec {
    DeploymentSpec {
        name: APP_NAME.to_string(),
        labels,
        replicas: 1,
        container: ContainerSpec {
            name: "wordpress".to_string(),
            image: APP_IMAGE.to_string(),
            ports: vec![ContainerPort {
                name: "http".to_string(),
                port: APP_HTTP_PORT,
            }],
            env: vec![
                EnvVar::literal(
                    "WORDPRESS_DB_HOST",
                    &format!("{}:{}", db.host, db.port),
                ),
                EnvVar::secret_key("WORDPRESS_DB_NAME", &db.secret_name, "db-name"),
                EnvVar::secret_key("WORDPRESS_DB_USER", &db.secret_name, "db-user"),
                EnvVar::secret_key("WORDPRESS_DB_PASSWORD", &db.secret_name, "db-password"),
                EnvVar::secret_key("WORDPRESS_ADMIN_USER", APP_SECRET, "admin-user"),
                EnvVar::secret_key("WORDPRESS_ADMIN_PASSWORD", APP_SECRET, "admin-password"),
                EnvVar::literal("WORDPRESS_SITE_URL", &store_url(config, &record.store_id)),
                EnvVar::literal("WORDPRESS_STORE_NAME", &record.name),
            ],
            resources: Resources {
                requests: ResourceAmounts::new("100m", "256Mi"),
                limits: ResourceAmounts::new("500m", "512Mi"),
            },
            liveness_probe: Some(Probe {
                action: ProbeAction::TcpSocket {
                    port: APP_HTTP_PORT,
                },
                initial_delay_secs: 60,
                period_secs: 10,
                timeout_secs: 5,
                failure_threshold: 3,
            }),
            readiness_probe: Some(Probe {
                // WordPress answers with a redirect until installed; any
                // HTTP response below 400 counts as ready.
                action: ProbeAction::HttpGet {
                    path: "/".to_string(),
                    port: APP_HTTP_PORT,
                },
                initial_delay_secs: 15,
                period_secs: 5,
                timeout_secs: 5,
                failure_threshold: 6,
            }),
            volume_mounts: vec![VolumeMount {
                name: "content".to_string(),
                mount_path: "/var/www/html".to_string(),
            }],
        },
        volumes: vec![PvcVolume {
            name: "content".to_string(),
            claim_name: APP_CONTENT_PVC.to_string(),
        }],
    }
}

fn ingress_spec(
    config: &ProvisionerConfig,
    record: &StoreRow,
    labels: BTreeMap<String, String>,
) -> IngressSpec {
    IngressSpec {
        name: APP_NAME.to_string(),
        labels,
        annotations: BTreeMap::from([
            (
                "nginx.ingress.kubernetes.io/proxy-body-size".to_string(),
                "64m".to_string(),
            ),
            (
                "nginx.ingress.kubernetes.io/proxy-read-timeout".to_string(),
                "120".to_string(),
            ),
        ]),
        class_name: config.ingress_class.clone(),
        host: store_host(config, &record.store_id),
        service_name: APP_NAME.to_string(),
        service_port: 80,
    }
}
