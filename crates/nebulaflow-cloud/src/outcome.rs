//! Reconciliation outcome types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of one reconciliation call: the derived status plus whether the
/// host should call again after a delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciled<S> {
    pub status: S,

    /// Delay after which the host should requeue, or `None` when converged
    pub requeue_after: Option<Duration>,
}

impl<S> Reconciled<S> {
    pub fn done(status: S) -> Self {
        Self {
            status,
            requeue_after: None,
        }
    }

    pub fn requeue(status: S, after: Duration) -> Self {
        Self {
            status,
            requeue_after: Some(after),
        }
    }

    pub fn is_done(&self) -> bool {
        self.requeue_after.is_none()
    }
}
