//! Control plane client trait definition

use crate::error::{CloudError, Result};
use crate::template::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of remote resource addressed by a control plane call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute instance
    Vm,
    /// Virtual router (load balancer)
    VirtualRouter,
    /// Virtual network or a reservation carved out of one
    VirtualNetwork,
    /// Disk image
    Image,
    /// Catalog template used to instantiate VMs
    Template,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Vm => write!(f, "VM"),
            ResourceKind::VirtualRouter => write!(f, "VR"),
            ResourceKind::VirtualNetwork => write!(f, "VNet"),
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Template => write!(f, "VM template"),
        }
    }
}

/// Remote-assigned resource identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full information about a resource, as returned by [`ControlPlane::fetch_info`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub id: ResourceId,

    pub name: String,

    /// The resource's configuration document
    pub template: Document,

    /// Raw state code, for kinds that report one (images)
    pub state: Option<i32>,

    /// Address ranges, for virtual networks
    pub address_ranges: Vec<AddressRange>,

    /// Member VMs, for virtual routers
    pub vms: Vec<ResourceId>,
}

impl ResourceInfo {
    pub fn new(id: ResourceId, name: impl Into<String>, template: Document) -> Self {
        Self {
            id,
            name: name.into(),
            template,
            state: None,
            address_ranges: Vec::new(),
            vms: Vec::new(),
        }
    }
}

/// An address range of a virtual network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    pub id: u32,

    /// First address of the range
    pub ip: Option<String>,

    pub size: u32,

    /// Addresses currently leased from this range
    pub leases: Vec<String>,
}

/// How [`ControlPlane::update`] applies the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Replace the whole user template
    Replace,
    /// Merge the given keys into the existing user template
    Merge,
}

/// Virtualization control plane client
///
/// Implementations own the transport (endpoint, credentials, retries). Every
/// method is a single remote round-trip.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Look up a resource id by name. Fails with [`CloudError::NotFound`] if absent.
    async fn resolve_id_by_name(&self, kind: ResourceKind, name: &str) -> Result<ResourceId>;

    /// Fetch a resource's full information
    async fn fetch_info(&self, kind: ResourceKind, id: ResourceId) -> Result<ResourceInfo>;

    /// Create a resource from a document and return its id
    async fn create(&self, kind: ResourceKind, template: &Document) -> Result<ResourceId>;

    /// Update a resource's user template
    async fn update(
        &self,
        kind: ResourceKind,
        id: ResourceId,
        template: &Document,
        mode: UpdateMode,
    ) -> Result<()>;

    /// Delete a resource. For VMs this is a forced terminate.
    async fn delete(&self, kind: ResourceKind, id: ResourceId) -> Result<()>;

    /// Release a leased address back to the network
    async fn release_lease(&self, network: ResourceId, address: &str) -> Result<()>;

    /// Instantiate the member VMs of a virtual router from a catalog template,
    /// with `extra` merged over the template
    async fn instantiate(
        &self,
        router: ResourceId,
        replicas: u32,
        template: ResourceId,
        extra: &Document,
    ) -> Result<Vec<ResourceId>>;

    /// Like [`ControlPlane::resolve_id_by_name`], mapping NotFound to `None`
    async fn find_id_by_name(&self, kind: ResourceKind, name: &str) -> Result<Option<ResourceId>> {
        match self.resolve_id_by_name(kind, name).await {
            Ok(id) => Ok(Some(id)),
            Err(CloudError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
