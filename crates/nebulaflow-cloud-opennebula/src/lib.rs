//! OpenNebula reconciliation engine for NebulaFlow
//!
//! This crate converges Cluster API style desired state against an
//! OpenNebula control plane reached through a [`ControlPlane`] client.
//!
//! # Features
//!
//! - Cluster infrastructure: images, VM templates, control plane load balancer
//! - Machines: VMs from catalog templates with cloud-init user data, registered
//!   as load balancer backends
//! - Teardown of the load balancer and its network reservations
//!
//! # Example
//!
//! ```ignore
//! use nebulaflow_cloud_opennebula::{ClusterReconciler, ReconcileConfig};
//! use std::sync::Arc;
//!
//! let reconciler = ClusterReconciler::new(Arc::new(client), ReconcileConfig::from_env()?);
//!
//! let outcome = reconciler.reconcile(&cluster).await?;
//! if let Some(after) = outcome.requeue_after {
//!     // call again later
//! }
//! ```
//!
//! [`ControlPlane`]: nebulaflow_cloud::ControlPlane

pub mod catalog;
pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod error;
pub mod instance;
pub mod keys;
pub mod lb;
pub mod machine;
pub mod model;
pub mod router;

pub use catalog::{ImageState, Images, Templates};
pub use cleanup::Cleanup;
pub use cluster::{ClusterReconciler, ClusterStatus, NetworkAddresses};
pub use config::ReconcileConfig;
pub use error::{OneError, Result};
pub use instance::{Instance, InstanceState};
pub use machine::{MachineReconciler, MachineStatus};
pub use model::{
    ApiEndpoint, ClusterSpec, ImageSpec, MachineRequest, MachineSpec, NetworkSpec, TemplateSpec,
    VirtualRouterSpec,
};
pub use router::{Router, RouterState};
