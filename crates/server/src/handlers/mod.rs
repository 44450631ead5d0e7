//! HTTP handlers.

pub mod audit;
pub mod health;
pub mod stores;

pub use audit::query_audit;
pub use health::{health_live, health_ready};
pub use stores::{create_store, delete_store, get_store, list_stores};
