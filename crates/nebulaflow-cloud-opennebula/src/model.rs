//! Desired-state model
//!
//! Field names follow the ONECluster / ONEMachine resources so a snapshot
//! deserializes straight from the host's objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An external network the cluster attaches to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub name: String,

    /// Explicit floating address; ignored unless it parses as an IP address
    #[serde(default, rename = "floatingIP", skip_serializing_if = "Option::is_none")]
    pub floating_ip: Option<String>,

    /// Lease only the floating address on this network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
}

impl NetworkSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// The control plane load balancer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualRouterSpec {
    /// Catalog template the router's VMs are instantiated from
    pub template_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    /// TCP ports to load-balance; none means the Kubernetes API port
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listener_ports: Vec<u16>,

    /// Context variables passed to the router VMs verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_context: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    #[serde(default)]
    pub image_name: String,

    #[serde(default)]
    pub image_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    pub template_name: String,

    #[serde(default)]
    pub template_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: u16,
}

/// Desired state of a workload cluster's infrastructure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Cluster object name, the prefix of every derived resource name
    pub name: String,

    /// Cluster object uid, used to tag catalog templates
    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_router: Option<VirtualRouterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network: Option<NetworkSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_network: Option<NetworkSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateSpec>,
}

impl ClusterSpec {
    /// Name of the control plane load balancer
    pub fn router_name(&self) -> String {
        format!("{}-cp", self.name)
    }
}

/// Desired state of one machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    pub name: String,

    pub template_name: String,

    /// Set once the machine has been created and registered
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Appended to the bootstrap data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Everything a machine reconciliation needs, with the collaborator lookups
/// (bootstrap secret, cluster networks) already resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineRequest {
    pub machine: MachineSpec,

    /// Bootstrap data; `None` while the bootstrap provider has not produced it
    pub bootstrap_data: Option<String>,

    /// Network attached to NIC 0
    pub network: Option<NetworkSpec>,

    /// Load balancer to register with, for control plane machines
    pub router: Option<VirtualRouterSpec>,
}
