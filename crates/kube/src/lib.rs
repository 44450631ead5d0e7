//! Kubernetes gateway for the Urumi platform: a thin facade over the
//! cluster REST API exposing only the operations the orchestrator
//! consumes, with create-if-absent semantics and retry-wrapped calls.

pub mod client;
pub mod cluster;
pub mod error;
pub mod exec;
pub mod objects;
pub mod traits;

pub use client::HttpGateway;
pub use cluster::ClusterConnection;
pub use error::{GatewayError, GatewayResult};
pub use traits::KubeGateway;

use std::sync::Arc;
use urumi_core::config::ClusterConfig;
use urumi_core::retry::RetryPolicy;

/// Create a gateway from configuration.
pub fn from_config(
    config: &ClusterConfig,
    retry: RetryPolicy,
) -> GatewayResult<Arc<dyn KubeGateway>> {
    let conn = ClusterConnection::resolve(config)?;
    tracing::info!(server = %conn.server, "Cluster gateway initialized");
    Ok(Arc::new(HttpGateway::new(conn, retry)?))
}
