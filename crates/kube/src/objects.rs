//! Typed object specifications rendered to cluster JSON manifests.
//!
//! The provisioner builds these specs; the gateway renders and submits
//! them. Only the fields the platform actually sets are modeled.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

fn string_map(map: &BTreeMap<String, String>) -> Value {
    let mut out = Map::new();
    for (key, value) in map {
        out.insert(key.clone(), Value::String(value.clone()));
    }
    Value::Object(out)
}

/// Namespace with labels and annotations.
#[derive(Debug, Clone)]
pub struct NamespaceSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl NamespaceSpec {
    pub fn manifest(&self) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": self.name,
                "labels": string_map(&self.labels),
                "annotations": string_map(&self.annotations),
            }
        })
    }
}

/// Resource quota with hard limits.
#[derive(Debug, Clone)]
pub struct QuotaSpec {
    pub name: String,
    pub hard: BTreeMap<String, String>,
}

impl QuotaSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ResourceQuota",
            "metadata": { "name": self.name, "namespace": namespace },
            "spec": { "hard": string_map(&self.hard) }
        })
    }
}

/// CPU/memory pair used in limit ranges and container resources.
#[derive(Debug, Clone)]
pub struct ResourceAmounts {
    pub cpu: String,
    pub memory: String,
}

impl ResourceAmounts {
    pub fn new(cpu: &str, memory: &str) -> Self {
        Self {
            cpu: cpu.to_string(),
            memory: memory.to_string(),
        }
    }

    fn as_value(&self) -> Value {
        json!({ "cpu": self.cpu, "memory": self.memory })
    }
}

/// Container limit range for a namespace.
#[derive(Debug, Clone)]
pub struct LimitRangeSpec {
    pub name: String,
    pub default_limits: ResourceAmounts,
    pub default_requests: ResourceAmounts,
    pub min: ResourceAmounts,
    pub max: ResourceAmounts,
}

impl LimitRangeSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "LimitRange",
            "metadata": { "name": self.name, "namespace": namespace },
            "spec": {
                "limits": [{
                    "type": "Container",
                    "default": self.default_limits.as_value(),
                    "defaultRequest": self.default_requests.as_value(),
                    "min": self.min.as_value(),
                    "max": self.max.as_value(),
                }]
            }
        })
    }
}

/// Network policy selecting all pods in the namespace. Rule bodies are
/// passed through as-is; the tenancy builder owns their shape.
#[derive(Debug, Clone)]
pub struct NetworkPolicySpec {
    pub name: String,
    pub ingress: Vec<Value>,
    pub egress: Vec<Value>,
}

impl NetworkPolicySpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": { "name": self.name, "namespace": namespace },
            "spec": {
                "podSelector": {},
                "policyTypes": ["Ingress", "Egress"],
                "ingress": self.ingress,
                "egress": self.egress,
            }
        })
    }
}

/// Opaque secret populated via stringData.
#[derive(Debug, Clone)]
pub struct SecretSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub string_data: BTreeMap<String, String>,
}

impl SecretSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": self.name,
                "namespace": namespace,
                "labels": string_map(&self.labels),
            },
            "type": "Opaque",
            "stringData": string_map(&self.string_data),
        })
    }
}

/// Environment variable value: a literal, or a reference to a secret key.
#[derive(Debug, Clone)]
pub enum EnvValue {
    Literal(String),
    SecretKey { secret: String, key: String },
}

/// Container environment variable.
#[derive(Debug, Clone)]
pub struct EnvVar {
    pub name: String,
    pub value: EnvValue,
}

impl EnvVar {
    pub fn literal(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: EnvValue::Literal(value.to_string()),
        }
    }

    pub fn secret_key(name: &str, secret: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            value: EnvValue::SecretKey {
                secret: secret.to_string(),
                key: key.to_string(),
            },
        }
    }

    fn as_value(&self) -> Value {
        match &self.value {
            EnvValue::Literal(value) => json!({ "name": self.name, "value": value }),
            EnvValue::SecretKey { secret, key } => json!({
                "name": self.name,
                "valueFrom": { "secretKeyRef": { "name": secret, "key": key } }
            }),
        }
    }
}

/// Liveness/readiness probe.
#[derive(Debug, Clone)]
pub enum ProbeAction {
    Exec { command: Vec<String> },
    HttpGet { path: String, port: i32 },
    TcpSocket { port: i32 },
}

#[derive(Debug, Clone)]
pub struct Probe {
    pub action: ProbeAction,
    pub initial_delay_secs: i32,
    pub period_secs: i32,
    pub timeout_secs: i32,
    pub failure_threshold: i32,
}

impl Probe {
    fn as_value(&self) -> Value {
        let mut probe = json!({
            "initialDelaySeconds": self.initial_delay_secs,
            "periodSeconds": self.period_secs,
            "timeoutSeconds": self.timeout_secs,
            "failureThreshold": self.failure_threshold,
        });
        let body = probe.as_object_mut().expect("probe is an object");
        match &self.action {
            ProbeAction::Exec { command } => {
                body.insert("exec".to_string(), json!({ "command": command }));
            }
            ProbeAction::HttpGet { path, port } => {
                body.insert("httpGet".to_string(), json!({ "path": path, "port": port }));
            }
            ProbeAction::TcpSocket { port } => {
                body.insert("tcpSocket".to_string(), json!({ "port": port }));
            }
        }
        probe
    }
}

/// Container port.
#[derive(Debug, Clone)]
pub struct ContainerPort {
    pub name: String,
    pub port: i32,
}

/// Volume mount within a container.
#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

/// Container resource requests/limits.
#[derive(Debug, Clone)]
pub struct Resources {
    pub requests: ResourceAmounts,
    pub limits: ResourceAmounts,
}

impl Resources {
    fn as_value(&self) -> Value {
        json!({
            "requests": self.requests.as_value(),
            "limits": self.limits.as_value(),
        })
    }
}

/// Single-container pod template shared by both workload kinds.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<ContainerPort>,
    pub env: Vec<EnvVar>,
    pub resources: Resources,
    pub liveness_probe: Option<Probe>,
    pub readiness_probe: Option<Probe>,
    pub volume_mounts: Vec<VolumeMount>,
}

impl ContainerSpec {
    fn as_value(&self) -> Value {
        let ports: Vec<Value> = self
            .ports
            .iter()
            .map(|p| json!({ "name": p.name, "containerPort": p.port }))
            .collect();
        let env: Vec<Value> = self.env.iter().map(EnvVar::as_value).collect();
        let mounts: Vec<Value> = self
            .volume_mounts
            .iter()
            .map(|m| json!({ "name": m.name, "mountPath": m.mount_path }))
            .collect();
        let mut container = json!({
            "name": self.name,
            "image": self.image,
            "ports": ports,
            "env": env,
            "resources": self.resources.as_value(),
            "volumeMounts": mounts,
        });
        let body = container.as_object_mut().expect("container is an object");
        if let Some(probe) = &self.liveness_probe {
            body.insert("livenessProbe".to_string(), probe.as_value());
        }
        if let Some(probe) = &self.readiness_probe {
            body.insert("readinessProbe".to_string(), probe.as_value());
        }
        container
    }
}

/// Stateful workload with a per-replica volume claim template.
#[derive(Debug, Clone)]
pub struct StatefulSetSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub replicas: i32,
    /// Headless service governing the set.
    pub service_name: String,
    pub container: ContainerSpec,
    pub volume_claim_name: String,
    pub volume_claim_storage: String,
}

impl StatefulSetSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": {
                "name": self.name,
                "namespace": namespace,
                "labels": string_map(&self.labels),
            },
            "spec": {
                "replicas": self.replicas,
                "serviceName": self.service_name,
                "selector": { "matchLabels": string_map(&self.labels) },
                "template": {
                    "metadata": { "labels": string_map(&self.labels) },
                    "spec": { "containers": [self.container.as_value()] }
                },
                "volumeClaimTemplates": [{
                    "metadata": { "name": self.volume_claim_name },
                    "spec": {
                        "accessModes": ["ReadWriteOnce"],
                        "resources": { "requests": { "storage": self.volume_claim_storage } }
                    }
                }]
            }
        })
    }
}

/// Volume backed by an existing PVC.
#[derive(Debug, Clone)]
pub struct PvcVolume {
    pub name: String,
    pub claim_name: String,
}

/// Stateless workload.
#[derive(Debug, Clone)]
pub struct DeploymentSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub replicas: i32,
    pub container: ContainerSpec,
    pub volumes: Vec<PvcVolume>,
}

impl DeploymentSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        let volumes: Vec<Value> = self
            .volumes
            .iter()
            .map(|v| {
                json!({
                    "name": v.name,
                    "persistentVolumeClaim": { "claimName": v.claim_name }
                })
            })
            .collect();
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": self.name,
                "namespace": namespace,
                "labels": string_map(&self.labels),
            },
            "spec": {
                "replicas": self.replicas,
                "selector": { "matchLabels": string_map(&self.labels) },
                "template": {
                    "metadata": { "labels": string_map(&self.labels) },
                    "spec": {
                        "containers": [self.container.as_value()],
                        "volumes": volumes,
                    }
                }
            }
        })
    }
}

/// Service port mapping.
#[derive(Debug, Clone)]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
    pub target_port: i32,
}

/// ClusterIP (or headless) service.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
    /// Render with clusterIP: None (headless, for stateful sets).
    pub headless: bool,
}

impl ServiceSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        let ports: Vec<Value> = self
            .ports
            .iter()
            .map(|p| json!({ "name": p.name, "port": p.port, "targetPort": p.target_port }))
            .collect();
        let mut spec = json!({
            "selector": string_map(&self.selector),
            "ports": ports,
        });
        if self.headless {
            spec.as_object_mut()
                .expect("spec is an object")
                .insert("clusterIP".to_string(), Value::String("None".to_string()));
        }
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": self.name,
                "namespace": namespace,
                "labels": string_map(&self.labels),
            },
            "spec": spec
        })
    }
}

/// Persistent volume claim.
#[derive(Debug, Clone)]
pub struct PvcSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub storage: String,
}

impl PvcSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": self.name,
                "namespace": namespace,
                "labels": string_map(&self.labels),
            },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": { "requests": { "storage": self.storage } }
            }
        })
    }
}

/// HTTP ingress rule for one host, path `/`, Prefix.
#[derive(Debug, Clone)]
pub struct IngressSpec {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub class_name: String,
    pub host: String,
    pub service_name: String,
    pub service_port: i32,
}

impl IngressSpec {
    pub fn manifest(&self, namespace: &str) -> Value {
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": {
                "name": self.name,
                "namespace": namespace,
                "labels": string_map(&self.labels),
                "annotations": string_map(&self.annotations),
            },
            "spec": {
                "ingressClassName": self.class_name,
                "rules": [{
                    "host": self.host,
                    "http": {
                        "paths": [{
                            "path": "/",
                            "pathType": "Prefix",
                            "backend": {
                                "service": {
                                    "name": self.service_name,
                                    "port": { "number": self.service_port }
                                }
                            }
                        }]
                    }
                }]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), "db".to_string())])
    }

    #[test]
    fn namespace_manifest_carries_labels_and_annotations() {
        let spec = NamespaceSpec {
            name: "store-ab12cd34".to_string(),
            labels: BTreeMap::from([("store-id".to_string(), "ab12cd34".to_string())]),
            annotations: BTreeMap::from([(
                "urumi.io/created-at".to_string(),
                "2025-01-01T00:00:00Z".to_string(),
            )]),
        };
        let manifest = spec.manifest();
        assert_eq!(manifest["kind"], "Namespace");
        assert_eq!(manifest["metadata"]["name"], "store-ab12cd34");
        assert_eq!(manifest["metadata"]["labels"]["store-id"], "ab12cd34");
        assert_eq!(
            manifest["metadata"]["annotations"]["urumi.io/created-at"],
            "2025-01-01T00:00:00Z"
        );
    }

    #[test]
    fn secret_manifest_uses_string_data() {
        let spec = SecretSpec {
            name: "db-credentials".to_string(),
            labels: labels(),
            string_data: BTreeMap::from([("db-password".to_string(), "p".to_string())]),
        };
        let manifest = spec.manifest("store-x");
        assert_eq!(manifest["type"], "Opaque");
        assert_eq!(manifest["stringData"]["db-password"], "p");
        assert_eq!(manifest["metadata"]["namespace"], "store-x");
    }

    #[test]
    fn env_var_secret_key_renders_value_from() {
        let env = EnvVar::secret_key("DB_PASSWORD", "db-credentials", "db-password");
        let value = env.as_value();
        assert_eq!(
            value["valueFrom"]["secretKeyRef"]["name"],
            "db-credentials"
        );
        assert_eq!(value["valueFrom"]["secretKeyRef"]["key"], "db-password");
    }

    #[test]
    fn stateful_set_manifest_has_claim_template_and_probes() {
        let spec = StatefulSetSpec {
            name: "db".to_string(),
            labels: labels(),
            replicas: 1,
            service_name: "db".to_string(),
            container: ContainerSpec {
                name: "mariadb".to_string(),
                image: "mariadb:11.4".to_string(),
                ports: vec![ContainerPort {
                    name: "mysql".to_string(),
                    port: 3306,
                }],
                env: vec![],
                resources: Resources {
                    requests: ResourceAmounts::new("100m", "256Mi"),
                    limits: ResourceAmounts::new("500m", "512Mi"),
                },
                liveness_probe: Some(Probe {
                    action: ProbeAction::Exec {
                        command: vec!["mysqladmin".to_string(), "ping".to_string()],
                    },
                    initial_delay_secs: 30,
                    period_secs: 10,
                    timeout_secs: 5,
                    failure_threshold: 3,
                }),
                readiness_probe: None,
                volume_mounts: vec![VolumeMount {
                    name: "data".to_string(),
                    mount_path: "/var/lib/mysql".to_string(),
                }],
            },
            volume_claim_name: "data".to_string(),
            volume_claim_storage: "2Gi".to_string(),
        };
        let manifest = spec.manifest("store-x");
        assert_eq!(manifest["spec"]["serviceName"], "db");
        assert_eq!(
            manifest["spec"]["volumeClaimTemplates"][0]["spec"]["resources"]["requests"]
                ["storage"],
            "2Gi"
        );
        let container = &manifest["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["livenessProbe"]["exec"]["command"][0], "mysqladmin");
        assert_eq!(container["volumeMounts"][0]["mountPath"], "/var/lib/mysql");
    }

    #[test]
    fn headless_service_sets_cluster_ip_none() {
        let spec = ServiceSpec {
            name: "db".to_string(),
            labels: labels(),
            selector: labels(),
            ports: vec![ServicePort {
                name: "mysql".to_string(),
                port: 3306,
                target_port: 3306,
            }],
            headless: true,
        };
        let manifest = spec.manifest("store-x");
        assert_eq!(manifest["spec"]["clusterIP"], "None");

        let clusterip = ServiceSpec {
            headless: false,
            ..spec
        };
        assert!(clusterip.manifest("store-x")["spec"].get("clusterIP").is_none());
    }

    #[test]
    fn ingress_manifest_routes_host_to_service() {
        let spec = IngressSpec {
            name: "storefront".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::from([(
                "nginx.ingress.kubernetes.io/proxy-body-size".to_string(),
                "64m".to_string(),
            )]),
            class_name: "nginx".to_string(),
            host: "store-ab12cd34.stores.local".to_string(),
            service_name: "storefront".to_string(),
            service_port: 80,
        };
        let manifest = spec.manifest("store-ab12cd34");
        assert_eq!(manifest["spec"]["ingressClassName"], "nginx");
        let rule = &manifest["spec"]["rules"][0];
        assert_eq!(rule["host"], "store-ab12cd34.stores.local");
        let path = &rule["http"]["paths"][0];
        assert_eq!(path["pathType"], "Prefix");
        assert_eq!(path["backend"]["service"]["port"]["number"], 80);
    }
}
