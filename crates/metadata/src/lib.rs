//! Durable state for the Urumi platform: store records and the
//! append-only audit log, over SQLite or PostgreSQL.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use store::{MetadataStore, SqliteStore};

use std::sync::Arc;
use urumi_core::config::DatabaseConfig;

/// Create a metadata store from configuration.
pub async fn from_config(config: &DatabaseConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        DatabaseConfig::Sqlite { path } => {
            tracing::info!(path = %path.display(), "Using SQLite state database");
            Ok(Arc::new(SqliteStore::new(path).await?))
        }
        DatabaseConfig::Postgres {
            url,
            max_connections,
        } => {
            tracing::info!("Using PostgreSQL state database");
            Ok(Arc::new(PostgresStore::from_url(url, *max_connections).await?))
        }
    }
}
