//! Core domain types for the Urumi store provisioning platform.
//!
//! This crate holds the pieces shared by every other crate: configuration,
//! the store lifecycle model (status/phase state machine), secret
//! generation and redaction, and the retry/deadline primitives that bound
//! every remote mutation.

pub mod config;
pub mod deadline;
pub mod error;
pub mod retry;
pub mod secrets;
pub mod store;

pub use error::{Error, Result};

/// Label applied to every namespace managed by the platform.
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Value of the managed-by label.
pub const MANAGED_BY_VALUE: &str = "urumi-platform";
