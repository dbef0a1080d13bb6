//! Control plane error types

use crate::provider::ResourceKind;
use thiserror::Error;

/// Errors surfaced by a control plane client and the template codec
#[derive(Error, Debug)]
pub enum CloudError {
    /// The named resource does not exist. Callers treat this as absence,
    /// not as a failure.
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("Remote call failed: {0}")]
    RemoteFailure(String),

    #[error("Invalid template at line {line}: {message}")]
    InvalidTemplate { line: usize, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CloudError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        CloudError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
