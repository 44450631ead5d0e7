//! Repository traits, one per concern.

pub mod audit;
pub mod stores;

pub use audit::AuditRepo;
pub use stores::StoreRepo;
