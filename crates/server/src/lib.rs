//! Urumi control-plane server: the admission surface and the
//! provisioning orchestrator.

pub mod audit;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod provision;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppState, WorkerRegistry};
