// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Network and measurement failures are NOT errors: they are reported as
/// diagnostic events and the run is skipped. Only storage and sink faults
/// travel through this type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },

    #[error("Diagnostics sink error: {0}")]
    Sink(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
