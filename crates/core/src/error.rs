//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid store name: {0}")]
    InvalidStoreName(String),

    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("invalid store status: {0}")]
    InvalidStatus(String),

    #[error("invalid provisioning phase: {0}")]
    InvalidPhase(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
