//! In-memory cluster gateway for orchestrator tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use urumi_kube::objects::{
    DeploymentSpec, IngressSpec, LimitRangeSpec, NamespaceSpec, NetworkPolicySpec, PvcSpec,
    QuotaSpec, SecretSpec, ServiceSpec, StatefulSetSpec,
};
use urumi_kube::{GatewayError, GatewayResult, KubeGateway};

/// Readiness behavior for a workload poll.
const READY_IMMEDIATELY: i64 = 0;
const NEVER_READY: i64 = -1;

/// Mock gateway that records every call and simulates namespace
/// lifecycle and workload readiness without a cluster.
pub struct MockGateway {
    /// Operation names in invocation order.
    calls: Mutex<Vec<String>>,
    /// Namespaces currently "existing" in the fake cluster.
    namespaces: Mutex<HashSet<String>>,
    /// Polls remaining before the database reports ready; -1 = never.
    db_ready_in: AtomicI64,
    /// Polls remaining before the application reports ready; -1 = never.
    app_ready_in: AtomicI64,
    /// Operations forced to fail: name -> (status, message).
    fail_ops: Mutex<HashMap<String, (u16, String)>>,
    /// Exec commands seen, in order.
    exec_commands: Mutex<Vec<Vec<String>>>,
}

#[allow(dead_code)]
impl MockGateway {
    /// Everything succeeds and readiness flips on the first poll.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            namespaces: Mutex::new(HashSet::new()),
            db_ready_in: AtomicI64::new(READY_IMMEDIATELY),
            app_ready_in: AtomicI64::new(READY_IMMEDIATELY),
            fail_ops: Mutex::new(HashMap::new()),
            exec_commands: Mutex::new(Vec::new()),
        })
    }

    /// The database workload never becomes ready.
    pub fn db_never_ready(self: &Arc<Self>) -> &Arc<Self> {
        self.db_ready_in.store(NEVER_READY, Ordering::SeqCst);
        self
    }

    /// The database becomes ready after `polls` readiness polls.
    pub fn db_ready_after(self: &Arc<Self>, polls: i64) -> &Arc<Self> {
        self.db_ready_in.store(polls, Ordering::SeqCst);
        self
    }

    /// The application workload never becomes ready.
    pub fn app_never_ready(self: &Arc<Self>) -> &Arc<Self> {
        self.app_ready_in.store(NEVER_READY, Ordering::SeqCst);
        self
    }

    /// Force `op` to fail with the given status from now on.
    pub fn fail_on(self: &Arc<Self>, op: &str, status: u16, message: &str) -> &Arc<Self> {
        self.fail_ops
            .lock()
            .unwrap()
            .insert(op.to_string(), (status, message.to_string()));
        self
    }

    /// Operation names in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Exec commands seen, in order.
    pub fn exec_commands(&self) -> Vec<Vec<String>> {
        self.exec_commands.lock().unwrap().clone()
    }

    /// Whether the fake cluster currently has this namespace.
    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.lock().unwrap().contains(name)
    }

    fn enter(&self, op: &str) -> GatewayResult<()> {
        self.calls.lock().unwrap().push(op.to_string());
        if let Some((status, message)) = self.fail_ops.lock().unwrap().get(op) {
            return Err(GatewayError::api(*status, message.clone()));
        }
        Ok(())
    }

    fn poll_readiness(counter: &AtomicI64) -> i32 {
        match counter.load(Ordering::SeqCst) {
            NEVER_READY => 0,
            0 => 1,
            _ => {
                counter.fetch_sub(1, Ordering::SeqCst);
                0
            }
        }
    }
}

#[async_trait]
impl KubeGateway for MockGateway {
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> GatewayResult<()> {
        self.enter("ensure_namespace")?;
        self.namespaces.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    async fn ensure_resource_quota(&self, _ns: &str, _spec: &QuotaSpec) -> GatewayResult<()> {
        self.enter("ensure_resource_quota")
    }

    async fn ensure_limit_range(&self, _ns: &str, _spec: &LimitRangeSpec) -> GatewayResult<()> {
        self.enter("ensure_limit_range")
    }

    async fn ensure_network_policy(
        &self,
        _ns: &str,
        _spec: &NetworkPolicySpec,
    ) -> GatewayResult<()> {
        self.enter("ensure_network_policy")
    }

    async fn ensure_secret(&self, _ns: &str, _spec: &SecretSpec) -> GatewayResult<()> {
        self.enter("ensure_secret")
    }

    async fn ensure_stateful_set(&self, _ns: &str, _spec: &StatefulSetSpec) -> GatewayResult<()> {
        self.enter("ensure_stateful_set")
    }

    async fn ensure_deployment(&self, _ns: &str, _spec: &DeploymentSpec) -> GatewayResult<()> {
        self.enter("ensure_deployment")
    }

    async fn ensure_service(&self, _ns: &str, _spec: &ServiceSpec) -> GatewayResult<()> {
        self.enter("ensure_service")
    }

    async fn ensure_pvc(&self, _ns: &str, _spec: &PvcSpec) -> GatewayResult<()> {
        self.enter("ensure_pvc")
    }

    async fn ensure_ingress(&self, _ns: &str, _spec: &IngressSpec) -> GatewayResult<()> {
        self.enter("ensure_ingress")
    }

    async fn deployment_ready_replicas(&self, _ns: &str, _name: &str) -> GatewayResult<i32> {
        self.enter("deployment_ready_replicas")?;
        Ok(Self::poll_readiness(&self.app_ready_in))
    }

    async fn stateful_set_ready_replicas(&self, _ns: &str, _name: &str) -> GatewayResult<i32> {
        self.enter("stateful_set_ready_replicas")?;
        Ok(Self::poll_readiness(&self.db_ready_in))
    }

    async fn delete_namespace(&self, name: &str) -> GatewayResult<()> {
        self.enter("delete_namespace")?;
        self.namespaces.lock().unwrap().remove(name);
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> GatewayResult<Option<String>> {
        self.enter("get_namespace")?;
        let present = self.namespaces.lock().unwrap().contains(name);
        Ok(present.then(|| "Active".to_string()))
    }

    async fn list_pods_by_label(&self, _ns: &str, _selector: &str) -> GatewayResult<Vec<String>> {
        self.enter("list_pods_by_label")?;
        Ok(vec!["storefront-5d9f4b7c6-x2x7q".to_string()])
    }

    async fn exec_in_pod(
        &self,
        _ns: &str,
        _pod: &str,
        argv: &[String],
        _timeout: Duration,
    ) -> GatewayResult<String> {
        self.enter("exec_in_pod")?;
        self.exec_commands.lock().unwrap().push(argv.to_vec());
        Ok(String::new())
    }

    async fn health_ping(&self) -> GatewayResult<()> {
        self.enter("health_ping")
    }
}
