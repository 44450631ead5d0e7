//! Post-install hook: best-effort WooCommerce configuration through the
//! pod exec channel.
//!
//! Each command is a plain argv vector run through the exec subresource,
//! bounded by the configured per-command timeout. Individual failures
//! are logged as warnings and never fail the validation phase; SKU
//! uniqueness makes the product seeding idempotent (a re-run's duplicate
//! create is rejected by the store and logged).

use super::application::APP_NAME;
use super::{ProvisionError, store_url};
use urumi_core::config::ProvisionerConfig;
use urumi_kube::KubeGateway;
use urumi_metadata::models::StoreRow;

/// Label selector resolving the application pod.
pub const APP_POD_SELECTOR: &str = "app=storefront";

/// Fixed sample catalog, keyed by SKU.
const SAMPLE_PRODUCTS: &[(&str, &str, &str)] = &[
    ("URUMI-TEE-001", "Classic Tee", "19.99"),
    ("URUMI-MUG-001", "Ceramic Mug", "12.50"),
    ("URUMI-CAP-001", "Baseball Cap", "15.00"),
    ("URUMI-TOTE-001", "Canvas Tote", "9.99"),
];

/// Run the post-install sequence against the application pod.
pub async fn run_post_install(
    gateway: &dyn KubeGateway,
    config: &ProvisionerConfig,
    record: &StoreRow,
) -> Result<(), ProvisionError> {
    let namespace = &record.namespace;
    let pods = gateway
        .list_pods_by_label(namespace, APP_POD_SELECTOR)
        .await?;
    let Some(pod) = pods.first() else {
        return Err(ProvisionError::Internal(format!(
            "no {APP_NAME} pod found in {namespace}"
        )));
    };

    let timeout = config.exec_command_timeout();
    let mut failures = 0usize;
    for argv in post_install_commands(config, record) {
        match gateway.exec_in_pod(namespace, pod, &argv, timeout).await {
            Ok(_) => {}
            Err(err) => {
                failures += 1;
                tracing::warn!(
                    store_id = %record.store_id,
                    command = %argv.first().map(String::as_str).unwrap_or(""),
                    args = ?argv,
                    error = %err,
                    "Post-install command failed"
                );
            }
        }
    }

    tracing::info!(
        store_id = %record.store_id,
        failures,
        "Post-install hook finished"
    );
    Ok(())
}

fn wp(args: &[&str]) -> Vec<String> {
    let mut argv = vec!["wp".to_string(), "--allow-root".to_string()];
    argv.extend(args.iter().map(|s| s.to_string()));
    argv
}

/// The full configuration sequence: storefront pages, cash-on-delivery,
/// sample products, store settings, rewrite flush.
fn post_install_commands(config: &ProvisionerConfig, record: &StoreRow) -> Vec<Vec<String>> {
    let mut commands = vec![
        wp(&["wc", "tool", "run", "install_pages", "--user=admin"]),
        wp(&[
            "wc",
            "payment_gateway",
            "update",
            "cod",
            "--enabled=true",
            "--user=admin",
        ]),
    ];

    for (sku, name, price) in SAMPLE_PRODUCTS {
        commands.push(wp(&[
            "wc",
            "product",
            "create",
            &format!("--name={name}"),
            &format!("--sku={sku}"),
            "--type=simple",
            &format!("--regular_price={price}"),
            "--status=publish",
            "--user=admin",
        ]));
    }

    commands.push(wp(&["option", "update", "blogname", &record.name]));
    commands.push(wp(&[
        "option",
        "update",
        "siteurl",
        &store_url(config, &record.store_id),
    ]));
    commands.push(wp(&["option", "update", "woocommerce_currency", "USD"]));
    commands.push(wp(&[
        "option",
        "update",
        "woocommerce_default_country",
        "US:CA",
    ]));
    commands.push(wp(&["rewrite", "flush", "--hard"]));

    commands
}
