//! Tenancy builder: brings a namespace to a state safe for a tenant
//! workload. Quota, container limits, and a deny-by-default network
//! policy with explicit allow-lists.

use super::ProvisionError;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use urumi_core::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use urumi_kube::KubeGateway;
use urumi_kube::objects::{
    LimitRangeSpec, NamespaceSpec, NetworkPolicySpec, QuotaSpec, ResourceAmounts,
};
use urumi_metadata::models::StoreRow;

/// Standard labels stamped on every object the platform manages.
pub fn standard_labels(record: &StoreRow) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        ("store-id".to_string(), record.store_id.clone()),
        ("store-name".to_string(), record.name.clone()),
        ("engine".to_string(), record.engine.clone()),
    ])
}

/// Create the namespace and install the isolation objects. Every step is
/// individually idempotent.
pub async fn build(gateway: &dyn KubeGateway, record: &StoreRow) -> Result<(), ProvisionError> {
    let namespace = &record.namespace;
    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    gateway
        .ensure_namespace(&NamespaceSpec {
            name: namespace.clone(),
            labels: standard_labels(record),
            annotations: BTreeMap::from([("urumi.io/created-at".to_string(), created_at)]),
        })
        .await?;

    gateway
        .ensure_resource_quota(namespace, &quota_spec())
        .await?;
    gateway
        .ensure_limit_range(namespace, &limit_range_spec())
        .await?;
    gateway
        .ensure_network_policy(namespace, &network_policy_spec())
        .await?;

    tracing::debug!(namespace = %namespace, "Tenancy isolation installed");
    Ok(())
}

fn quota_spec() -> QuotaSpec {
    QuotaSpec {
        name: "store-quota".to_string(),
        hard: BTreeMap::from([
            ("requests.cpu".to_string(), "500m".to_string()),
            ("limits.cpu".to_string(), "2".to_string()),
            ("requests.memory".to_string(), "512Mi".to_string()),
            ("limits.memory".to_string(), "2Gi".to_string()),
            ("requests.storage".to_string(), "5Gi".to_string()),
            ("pods".to_string(), "10".to_string()),
            ("services".to_string(), "5".to_string()),
            ("secrets".to_string(), "10".to_string()),
            ("configmaps".to_string(), "10".to_string()),
            ("persistentvolumeclaims".to_string(), "3".to_string()),
        ]),
    }
}

fn limit_range_spec() -> LimitRangeSpec {
    LimitRangeSpec {
        name: "store-limits".to_string(),
        default_limits: ResourceAmounts::new("500m", "512Mi"),
        default_requests: ResourceAmounts::new("100m", "128Mi"),
        min: ResourceAmounts::new("50m", "64Mi"),
        max: ResourceAmounts::new("1", "1Gi"),
    }
}

/// Ingress: the ingress controller's namespace plus intra-namespace.
/// Egress: cluster DNS, intra-namespace, and outbound HTTP(S) for
/// package and plugin fetches. Everything else is denied.
fn network_policy_spec() -> NetworkPolicySpec {
    let ingress: Vec<Value> = vec![
        json!({
            "from": [{
                "namespaceSelector": {
                    "matchLabels": { "kubernetes.io/metadata.name": "ingress-nginx" }
                }
            }]
        }),
        json!({ "from": [{ "podSelector": {} }] }),
    ];
    let egress: Vec<Value> = vec![
        json!({
            "to": [{ "namespaceSelector": {} }],
            "ports": [
                { "protocol": "UDP", "port": 53 },
                { "protocol": "TCP", "port": 53 }
            ]
        }),
        json!({ "to": [{ "podSelector": {} }] }),
        json!({
            "ports": [
                { "protocol": "TCP", "port": 80 },
                { "protocol": "TCP", "port": 443 }
            ]
        }),
    ];
    NetworkPolicySpec {
        name: "store-isolation".to_string(),
        ingress,
        egress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn record() -> StoreRow {
        StoreRow {
            store_id: "ab12cd34".to_string(),
            name: "my-shop".to_string(),
            namespace: "store-ab12cd34".to_string(),
            engine: "woocommerce".to_string(),
            status: "provisioning".to_string(),
            phase: Some("namespace".to_string()),
            url: None,
            admin_url: None,
            db_ready: false,
            app_ready: false,
            error_message: None,
            error_phase: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
            ready_at: None,
            deleted_at: None,
            provisioning_duration_ms: None,
        }
    }

    #[test]
    fn labels_identify_the_tenant() {
        let labels = standard_labels(&record());
        assert_eq!(labels.get("managed-by").unwrap(), "urumi-platform");
        assert_eq!(labels.get("store-id").unwrap(), "ab12cd34");
        assert_eq!(labels.get("store-name").unwrap(), "my-shop");
        assert_eq!(labels.get("engine").unwrap(), "woocommerce");
    }

    #[test]
    fn quota_caps_tenant_resources() {
        let quota = quota_spec();
        assert_eq!(quota.hard.get("limits.cpu").unwrap(), "2");
        assert_eq!(quota.hard.get("limits.memory").unwrap(), "2Gi");
        assert_eq!(quota.hard.get("pods").unwrap(), "10");
        assert_eq!(quota.hard.get("persistentvolumeclaims").unwrap(), "3");
    }

    #[test]
    fn network_policy_allows_ingress_controller_and_dns() {
        let policy = network_policy_spec();
        let manifest = policy.manifest("store-ab12cd34");
        let ingress = manifest["spec"]["ingress"].as_array().unwrap();
        assert_eq!(
            ingress[0]["from"][0]["namespaceSelector"]["matchLabels"]
                ["kubernetes.io/metadata.name"],
            "ingress-nginx"
        );
        let egress = manifest["spec"]["egress"].as_array().unwrap();
        assert_eq!(egress[0]["ports"][0]["port"], 53);
        // Outbound web access carries no destination selector.
        assert!(egress[2].get("to").is_none());
        assert_eq!(egress[2]["ports"][1]["port"], 443);
    }
}
