//! Engine configuration

use crate::error::{OneError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const REQUEUE_SECS_ENV: &str = "NEBULAFLOW_REQUEUE_SECS";
pub const CONTROL_PLANE_PORT_ENV: &str = "NEBULAFLOW_CONTROL_PLANE_PORT";

/// Default Kubernetes API server port
pub const DEFAULT_CONTROL_PLANE_PORT: u16 = 6443;

const DEFAULT_REQUEUE_SECS: u64 = 5;

/// Settings shared by the cluster and machine reconcilers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcileConfig {
    /// Delay before the host should retry a call that is waiting on the
    /// control plane (images uploading, bootstrap data missing)
    pub requeue_after_secs: u64,

    /// Port used for the control plane endpoint when none is set
    pub control_plane_port: u16,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            requeue_after_secs: DEFAULT_REQUEUE_SECS,
            control_plane_port: DEFAULT_CONTROL_PLANE_PORT,
        }
    }
}

impl ReconcileConfig {
    /// Defaults overridden by `NEBULAFLOW_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = env_var(REQUEUE_SECS_ENV)? {
            config.requeue_after_secs = secs;
        }
        if let Some(port) = env_var(CONTROL_PLANE_PORT_ENV)? {
            config.control_plane_port = port;
        }
        Ok(config)
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| OneError::InvalidConfig(format!("{}={:?} is not valid", name, value))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::default();
        assert_eq!(config.requeue_after(), Duration::from_secs(5));
        assert_eq!(config.control_plane_port, 6443);
    }

    #[test]
    fn test_from_env_overrides() {
        temp_env::with_vars(
            [(REQUEUE_SECS_ENV, Some("30")), (CONTROL_PLANE_PORT_ENV, Some("8443"))],
            || {
                let config = ReconcileConfig::from_env().unwrap();
                assert_eq!(config.requeue_after_secs, 30);
                assert_eq!(config.control_plane_port, 8443);
            },
        );
    }

    #[test]
    fn test_from_env_unset_uses_defaults() {
        temp_env::with_vars_unset([REQUEUE_SECS_ENV, CONTROL_PLANE_PORT_ENV], || {
            assert_eq!(ReconcileConfig::from_env().unwrap(), ReconcileConfig::default());
        });
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        temp_env::with_var(CONTROL_PLANE_PORT_ENV, Some("https"), || {
            let err = ReconcileConfig::from_env().unwrap_err();
            assert!(matches!(err, OneError::InvalidConfig(_)));
        });
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ReconcileConfig = serde_json::from_str(r#"{"requeueAfterSecs": 10}"#).unwrap();
        assert_eq!(config.requeue_after_secs, 10);
        assert_eq!(config.control_plane_port, 6443);
    }
}
