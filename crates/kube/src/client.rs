//! HTTP gateway speaking the cluster REST API.

use crate::cluster::ClusterConnection;
use crate::error::{GatewayError, GatewayResult};
use crate::exec;
use crate::objects::{
    DeploymentSpec, IngressSpec, LimitRangeSpec, NamespaceSpec, NetworkPolicySpec, PvcSpec,
    QuotaSpec, SecretSpec, ServiceSpec, StatefulSetSpec,
};
use crate::traits::KubeGateway;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};
use std::time::Duration;
use urumi_core::retry::{RetryPolicy, retry_with_policy};

/// Gateway implementation over the cluster's REST API. Every operation
/// is retry-wrapped with the configured policy.
pub struct HttpGateway {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    retry: RetryPolicy,
    conn: ClusterConnection,
}

impl HttpGateway {
    /// Build a gateway for a resolved cluster connection.
    pub fn new(conn: ClusterConnection, retry: RetryPolicy) -> GatewayResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ca_pem) = &conn.ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(ca_pem)?);
        }
        if conn.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let (Some(cert), Some(key)) = (&conn.client_cert_pem, &conn.client_key_pem) {
            builder = builder.identity(reqwest::Identity::from_pkcs8_pem(cert, key)?);
        }
        let http = builder.build()?;
        let base = Url::parse(&conn.server)
            .map_err(|e| GatewayError::Config(format!("invalid API server URL: {e}")))?;
        let token = conn.token.clone();
        Ok(Self {
            http,
            base,
            token,
            retry,
            conn,
        })
    }

    fn url(&self, path: &str) -> GatewayResult<Url> {
        self.base
            .join(path)
            .map_err(|e| GatewayError::Config(format!("invalid API path: {e}")))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Turn a non-success response into an API error, surfacing the
    /// Status message when the server sent one.
    async fn api_error(resp: reqwest::Response) -> GatewayError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);
        GatewayError::api(status, message)
    }

    /// POST a manifest to a collection; 409 ("already exists") is success
    /// with no read-back of the existing object.
    async fn create(&self, path: &str, manifest: &Value) -> GatewayResult<()> {
        let url = self.url(path)?;
        retry_with_policy(&self.retry, GatewayError::is_retryable, || {
            let url = url.clone();
            async move {
                let resp = self
                    .authorize(self.http.post(url))
                    .json(manifest)
                    .send()
                    .await?;
                let status = resp.status();
                if status.is_success() || status.as_u16() == 409 {
                    return Ok(());
                }
                Err(Self::api_error(resp).await)
            }
        })
        .await
    }

    /// GET an object; None on 404.
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> GatewayResult<Option<Value>> {
        let url = self.url(path)?;
        retry_with_policy(&self.retry, GatewayError::is_retryable, || {
            let url = url.clone();
            async move {
                let resp = self
                    .authorize(self.http.get(url))
                    .query(query)
                    .send()
                    .await?;
                let status = resp.status();
                if status.as_u16() == 404 {
                    return Ok(None);
                }
                if !status.is_success() {
                    return Err(Self::api_error(resp).await);
                }
                Ok(Some(resp.json::<Value>().await?))
            }
        })
        .await
    }

    async fn read_ready_replicas(&self, path: &str) -> GatewayResult<i32> {
        // A workload the API cannot see yet simply is not ready.
        let ready = self
            .get_json(path, &[])
            .await?
            .and_then(|obj| obj["status"]["readyReplicas"].as_i64())
            .unwrap_or(0);
        Ok(ready as i32)
    }
}

#[async_trait]
impl KubeGateway for HttpGateway {
    async fn ensure_namespace(&self, spec: &NamespaceSpec) -> GatewayResult<()> {
        self.create("/api/v1/namespaces", &spec.manifest()).await
    }

    async fn ensure_resource_quota(&self, namespace: &str, spec: &QuotaSpec) -> GatewayResult<()> {
        self.create(
            &format!("/api/v1/namespaces/{namespace}/resourcequotas"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_limit_range(
        &self,
        namespace: &str,
        spec: &LimitRangeSpec,
    ) -> GatewayResult<()> {
        self.create(
            &format!("/api/v1/namespaces/{namespace}/limitranges"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_network_policy(
        &self,
        namespace: &str,
        spec: &NetworkPolicySpec,
    ) -> GatewayResult<()> {
        self.create(
            &format!("/apis/networking.k8s.io/v1/namespaces/{namespace}/networkpolicies"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_secret(&self, namespace: &str, spec: &SecretSpec) -> GatewayResult<()> {
        self.create(
            &format!("/api/v1/namespaces/{namespace}/secrets"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_stateful_set(
        &self,
        namespace: &str,
        spec: &StatefulSetSpec,
    ) -> GatewayResult<()> {
        self.create(
            &format!("/apis/apps/v1/namespaces/{namespace}/statefulsets"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_deployment(
        &self,
        namespace: &str,
        spec: &DeploymentSpec,
    ) -> GatewayResult<()> {
        self.create(
            &format!("/apis/apps/v1/namespaces/{namespace}/deployments"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_service(&self, namespace: &str, spec: &ServiceSpec) -> GatewayResult<()> {
        self.create(
            &format!("/api/v1/namespaces/{namespace}/services"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_pvc(&self, namespace: &str, spec: &PvcSpec) -> GatewayResult<()> {
        self.create(
            &format!("/api/v1/namespaces/{namespace}/persistentvolumeclaims"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn ensure_ingress(&self, namespace: &str, spec: &IngressSpec) -> GatewayResult<()> {
        self.create(
            &format!("/apis/networking.k8s.io/v1/namespaces/{namespace}/ingresses"),
            &spec.manifest(namespace),
        )
        .await
    }

    async fn deployment_ready_replicas(&self, namespace: &str, name: &str) -> GatewayResult<i32> {
        self.read_ready_replicas(&format!(
            "/apis/apps/v1/namespaces/{namespace}/deployments/{name}"
        ))
        .await
    }

    async fn stateful_set_ready_replicas(
        &self,
        namespace: &str,
        name: &str,
    ) -> GatewayResult<i32> {
        self.read_ready_replicas(&format!(
            "/apis/apps/v1/namespaces/{namespace}/statefulsets/{name}"
        ))
        .await
    }

    async fn delete_namespace(&self, name: &str) -> GatewayResult<()> {
        let url = self.url(&format!("/api/v1/namespaces/{name}"))?;
        let options = json!({
            "apiVersion": "v1",
            "kind": "DeleteOptions",
            "propagationPolicy": "Foreground",
        });
        retry_with_policy(&self.retry, GatewayError::is_retryable, || {
            let url = url.clone();
            let options = options.clone();
            async move {
                let resp = self
                    .authorize(self.http.delete(url))
                    .json(&options)
                    .send()
                    .await?;
                let status = resp.status();
                // Absent namespaces are already deleted.
                if status.is_success() || status.as_u16() == 404 {
                    return Ok(());
                }
                Err(Self::api_error(resp).await)
            }
        })
        .await
    }

    async fn get_namespace(&self, name: &str) -> GatewayResult<Option<String>> {
        let object = self
            .get_json(&format!("/api/v1/namespaces/{name}"), &[])
            .await?;
        Ok(object.map(|obj| {
            obj["status"]["phase"]
                .as_str()
                .unwrap_or("Unknown")
                .to_string()
        }))
    }

    async fn list_pods_by_label(
        &self,
        namespace: &str,
        selector: &str,
    ) -> GatewayResult<Vec<String>> {
        let object = self
            .get_json(
                &format!("/api/v1/namespaces/{namespace}/pods"),
                &[("labelSelector", selector)],
            )
            .await?;
        let names = object
            .and_then(|obj| {
                obj["items"].as_array().map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item["metadata"]["name"].as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                })
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn exec_in_pod(
        &self,
        namespace: &str,
        pod: &str,
        argv: &[String],
        timeout: Duration,
    ) -> GatewayResult<String> {
        exec::exec_in_pod(&self.conn, namespace, pod, argv, timeout).await
    }

    async fn health_ping(&self) -> GatewayResult<()> {
        let url = self.url("/version")?;
        let resp = self.authorize(self.http.get(url)).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::api_error(resp).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::collections::BTreeMap;

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn gateway_for(server: &MockServer) -> HttpGateway {
        let conn = ClusterConnection {
            server: server.base_url(),
            ..ClusterConnection::default()
        };
        HttpGateway::new(conn, test_policy()).unwrap()
    }

    fn namespace_spec() -> NamespaceSpec {
        NamespaceSpec {
            name: "store-ab12cd34".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn ensure_namespace_posts_manifest() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/namespaces")
                    .json_body_partial(r#"{"kind": "Namespace"}"#);
                then.status(201).json_body(serde_json::json!({}));
            })
            .await;

        gateway_for(&server)
            .ensure_namespace(&namespace_spec())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn conflict_on_create_is_success() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/namespaces");
                then.status(409).json_body(serde_json::json!({
                    "kind": "Status",
                    "message": "namespaces \"store-ab12cd34\" already exists"
                }));
            })
            .await;

        gateway_for(&server)
            .ensure_namespace(&namespace_spec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transient_503_exhausts_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/namespaces");
                then.status(503).body("unavailable");
            })
            .await;

        let err = gateway_for(&server)
            .ensure_namespace(&namespace_spec())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        // Initial attempt plus two retries.
        assert_eq!(mock.hits_async().await, 3);
    }

    #[tokio::test]
    async fn bad_request_does_not_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/namespaces");
                then.status(422).json_body(serde_json::json!({
                    "kind": "Status",
                    "message": "invalid manifest"
                }));
            })
            .await;

        let err = gateway_for(&server)
            .ensure_namespace(&namespace_spec())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Api { status: 422, .. }));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn absent_namespace_reads_as_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/namespaces/store-gone");
                then.status(404).json_body(serde_json::json!({
                    "kind": "Status",
                    "message": "namespaces \"store-gone\" not found"
                }));
            })
            .await;

        let phase = gateway_for(&server)
            .get_namespace("store-gone")
            .await
            .unwrap();
        assert!(phase.is_none());
    }

    #[tokio::test]
    async fn namespace_phase_is_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/namespaces/store-x");
                then.status(200)
                    .json_body(serde_json::json!({ "status": { "phase": "Terminating" } }));
            })
            .await;

        let phase = gateway_for(&server).get_namespace("store-x").await.unwrap();
        assert_eq!(phase.as_deref(), Some("Terminating"));
    }

    #[tokio::test]
    async fn ready_replicas_defaults_to_zero() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/apis/apps/v1/namespaces/store-x/deployments/storefront");
                then.status(200).json_body(serde_json::json!({ "status": {} }));
            })
            .await;

        let ready = gateway_for(&server)
            .deployment_ready_replicas("store-x", "storefront")
            .await
            .unwrap();
        assert_eq!(ready, 0);
    }

    #[tokio::test]
    async fn ready_replicas_parses_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/apis/apps/v1/namespaces/store-x/statefulsets/db");
                then.status(200)
                    .json_body(serde_json::json!({ "status": { "readyReplicas": 1 } }));
            })
            .await;

        let ready = gateway_for(&server)
            .stateful_set_ready_replicas("store-x", "db")
            .await
            .unwrap();
        assert_eq!(ready, 1);
    }

    #[tokio::test]
    async fn delete_namespace_requests_foreground_propagation() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/api/v1/namespaces/store-x")
                    .json_body_partial(r#"{"propagationPolicy": "Foreground"}"#);
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        gateway_for(&server).delete_namespace("store-x").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_namespace_tolerates_absent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/api/v1/namespaces/store-x");
                then.status(404).body("not found");
            })
            .await;

        gateway_for(&server).delete_namespace("store-x").await.unwrap();
    }

    #[tokio::test]
    async fn list_pods_extracts_names() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/namespaces/store-x/pods")
                    .query_param("labelSelector", "app=storefront");
                then.status(200).json_body(serde_json::json!({
                    "items": [
                        { "metadata": { "name": "storefront-5d9f" } },
                        { "metadata": { "name": "storefront-a1b2" } }
                    ]
                }));
            })
            .await;

        let pods = gateway_for(&server)
            .list_pods_by_label("store-x", "app=storefront")
            .await
            .unwrap();
        assert_eq!(pods, vec!["storefront-5d9f", "storefront-a1b2"]);
    }

    #[tokio::test]
    async fn health_ping_hits_version() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/version");
                then.status(200)
                    .json_body(serde_json::json!({ "gitVersion": "v1.31.0" }));
            })
            .await;

        gateway_for(&server).health_ping().await.unwrap();
        mock.assert_async().await;
    }
}
