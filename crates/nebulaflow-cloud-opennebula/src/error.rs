//! OpenNebula engine error types

use nebulaflow_cloud::{CloudError, ResourceId, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OneError {
    /// A resolved resource lacks a key the engine cannot proceed without
    #[error("{kind} {id} is missing {key}")]
    Malformed {
        kind: ResourceKind,
        id: ResourceId,
        key: String,
    },

    #[error("Failed to {op}: {source}")]
    Operation {
        op: &'static str,
        #[source]
        source: Box<OneError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

impl OneError {
    pub fn malformed(kind: ResourceKind, id: ResourceId, key: impl Into<String>) -> Self {
        OneError::Malformed {
            kind,
            id,
            key: key.into(),
        }
    }

    /// Whether the root cause is a NotFound from the control plane
    pub fn is_not_found(&self) -> bool {
        match self {
            OneError::Cloud(e) => e.is_not_found(),
            OneError::Operation { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Wrap errors with the name of the operation that failed
pub trait ResultExt<T> {
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T, E: Into<OneError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|e| OneError::Operation {
            op,
            source: Box::new(e.into()),
        })
    }
}

pub type Result<T> = std::result::Result<T, OneError>;
