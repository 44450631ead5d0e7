//! Gateway trait definition.

use crate::error::GatewayResult;
use crate::objects::{
    DeploymentSpec, IngressSpec, LimitRangeSpec, NamespaceSpec, NetworkPolicySpec, PvcSpec,
    QuotaSpec, SecretSpec, ServiceSpec, StatefulSetSpec,
};
use async_trait::async_trait;
use std::time::Duration;

/// Thin facade over the cluster API, exposing only the operations the
/// orchestrator consumes.
///
/// Every `ensure_*` operation is create-if-absent: the "already exists"
/// answer from the cluster is success, with no read-back and no mutation
/// of the existing object. This makes the whole provisioning pipeline
/// safe to retry from the beginning.
#[async_trait]
pub trait KubeGateway: Send + Sync + 'static {
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> GatewayResult<()>;

    async fn ensure_resource_quota(&self, namespace: &str, spec: &QuotaSpec) -> GatewayResult<()>;

    async fn ensure_limit_range(&self, namespace: &str, spec: &LimitRangeSpec)
    -> GatewayResult<()>;

    async fn ensure_network_policy(
        &self,
        namespace: &str,
        spec: &NetworkPolicySpec,
    ) -> GatewayResult<()>;

    async fn ensure_secret(&self, namespace: &str, spec: &SecretSpec) -> GatewayResult<()>;

    async fn ensure_stateful_set(
        &self,
        namespace: &str,
        spec: &StatefulSetSpec,
    ) -> GatewayResult<()>;

    async fn ensure_deployment(&self, namespace: &str, spec: &DeploymentSpec)
    -> GatewayResult<()>;

    async fn ensure_service(&self, namespace: &str, spec: &ServiceSpec) -> GatewayResult<()>;

    async fn ensure_pvc(&self, namespace: &str, spec: &PvcSpec) -> GatewayResult<()>;

    async fn ensure_ingress(&self, namespace: &str, spec: &IngressSpec) -> GatewayResult<()>;

    /// Ready replica count from deployment status (0 when unset).
    async fn deployment_ready_replicas(&self, namespace: &str, name: &str) -> GatewayResult<i32>;

    /// Ready replica count from stateful set status (0 when unset).
    async fn stateful_set_ready_replicas(&self, namespace: &str, name: &str)
    -> GatewayResult<i32>;

    /// Delete a namespace with foreground propagation: children are
    /// removed before the namespace object disappears. Absent namespaces
    /// are treated as already deleted.
    async fn delete_namespace(&self, name: &str) -> GatewayResult<()>;

    /// Namespace phase (e.g. "Active", "Terminating"), or None when gone.
    async fn get_namespace(&self, name: &str) -> GatewayResult<Option<String>>;

    /// Pod names matching a label selector.
    async fn list_pods_by_label(
        &self,
        namespace: &str,
        selector: &str,
    ) -> GatewayResult<Vec<String>>;

    /// Run `argv` in a pod through the exec subresource and collect
    /// stdout. Arguments are passed verbatim; no shell is ever involved.
    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        argv: &[String],
        timeout: Duration,
    ) -> GatewayResult<String>;

    /// One lightweight read to verify API connectivity.
    async fn health_ping(&self) -> GatewayResult<()>;
}
