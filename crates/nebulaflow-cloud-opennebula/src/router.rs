//! Virtual router handle
//!
//! The router is the control plane load balancer: a VR object holding the
//! floating addresses, backed by `replicas` VMs running HAProxy.

use crate::error::{Result, ResultExt};
use crate::keys;
use crate::lb;
use crate::model::{NetworkSpec, VirtualRouterSpec};
use nebulaflow_cloud::{
    CONTEXT_SECTION, ControlPlane, Document, NIC_SECTION, ResourceId, ResourceKind, Section,
};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterState {
    Unresolved,
    Resolved {
        id: ResourceId,
        /// `VROUTER_IP` of every NIC that has one, in NIC order
        floating_ips: Vec<String>,
        /// Member VMs
        instances: Vec<ResourceId>,
    },
}

pub struct Router {
    client: Arc<dyn ControlPlane>,
    name: String,
    replicas: u32,
    state: RouterState,
}

impl Router {
    pub fn new(client: Arc<dyn ControlPlane>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            replicas: 1,
            state: RouterState::Unresolved,
        }
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    pub fn exists(&self) -> bool {
        matches!(self.state, RouterState::Resolved { .. })
    }

    pub fn id(&self) -> Option<ResourceId> {
        match &self.state {
            RouterState::Resolved { id, .. } => Some(*id),
            RouterState::Unresolved => None,
        }
    }

    /// Floating addresses, empty while unresolved
    pub fn floating_ips(&self) -> &[String] {
        match &self.state {
            RouterState::Resolved { floating_ips, .. } => floating_ips,
            RouterState::Unresolved => &[],
        }
    }

    pub fn instances(&self) -> &[ResourceId] {
        match &self.state {
            RouterState::Resolved { instances, .. } => instances,
            RouterState::Unresolved => &[],
        }
    }

    pub async fn resolve_by_id(&mut self, id: ResourceId) -> Result<()> {
        let info = self
            .client
            .fetch_info(ResourceKind::VirtualRouter, id)
            .await
            .context("fetch VR")?;

        let floating_ips = info
            .template
            .nics()
            .filter_map(|nic| nic.get(keys::VROUTER_IP))
            .map(str::to_string)
            .collect();

        self.name = info.name;
        self.state = RouterState::Resolved {
            id,
            floating_ips,
            instances: info.vms,
        };
        Ok(())
    }

    pub async fn resolve_by_name(&mut self, name: &str) -> Result<()> {
        let id = self
            .client
            .resolve_id_by_name(ResourceKind::VirtualRouter, name)
            .await
            .context("fetch VR")?;
        self.resolve_by_id(id).await
    }

    /// Resolve by the handle's name, leaving it unresolved if no such VR exists
    pub async fn resolve_if_exists(&mut self) -> Result<bool> {
        let name = self.name.clone();
        match self
            .client
            .find_id_by_name(ResourceKind::VirtualRouter, &name)
            .await
        {
            Ok(Some(id)) => {
                self.resolve_by_id(id).await?;
                Ok(true)
            }
            Ok(None) => {
                tracing::debug!("VR {} does not exist", name);
                self.state = RouterState::Unresolved;
                Ok(false)
            }
            Err(e) => Err(e).context("fetch VR"),
        }
    }

    /// Create the VR with a public NIC then a private NIC (each optional),
    /// then instantiate its VMs. No-op if already resolved.
    pub async fn create_from_template(
        &mut self,
        spec: &VirtualRouterSpec,
        public_network: Option<&NetworkSpec>,
        private_network: Option<&NetworkSpec>,
    ) -> Result<()> {
        if self.exists() {
            tracing::debug!("VR {} already exists", self.name);
            return Ok(());
        }

        let mut template = Document::new();
        template.add_pair(keys::NAME, self.name.as_str());
        // Public NIC at 0 when present, private NIC right after it.
        if let Some(network) = public_network {
            template.add_section(floating_nic(network, network.floating_only.unwrap_or(true)));
        }
        if let Some(network) = private_network {
            template.add_section(floating_nic(network, network.floating_only.unwrap_or(false)));
        }

        tracing::info!("Creating VR {}", self.name);
        let id = self
            .client
            .create(ResourceKind::VirtualRouter, &template)
            .await
            .context("create VR")?;
        self.resolve_by_id(id).await.context("create VR")?;

        self.instantiate(spec).await
    }

    /// Instantiate the router VMs if the resolved VR has none, completing a
    /// creation that was interrupted after the VR itself was created
    pub async fn ensure_instances(&mut self, spec: &VirtualRouterSpec) -> Result<()> {
        if !self.exists() || !self.instances().is_empty() {
            return Ok(());
        }
        tracing::info!("VR {} has no VMs", self.name);
        self.instantiate(spec).await
    }

    async fn instantiate(&mut self, spec: &VirtualRouterSpec) -> Result<()> {
        let Some(id) = self.id() else {
            return Ok(());
        };

        let template_id = self
            .client
            .resolve_id_by_name(ResourceKind::Template, &spec.template_name)
            .await
            .context("find VR template")?;
        let mut template = self
            .client
            .fetch_info(ResourceKind::Template, template_id)
            .await
            .context("fetch VR template")?
            .template;
        template.remove(keys::CLUSTER_UID);
        // Router VMs are named after the VR, not the catalog entry.
        template.remove(keys::NAME);

        // Extra context goes last so it wins on collision.
        let context = template.ensure_section(CONTEXT_SECTION);
        context.upsert(lb::frontend_context(&spec.listener_ports));
        context.upsert(spec.extra_context.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        tracing::info!("Instantiating {} VMs for VR {}", self.replicas, self.name);
        let vms = self
            .client
            .instantiate(id, self.replicas, template_id, &template)
            .await
            .context("create VR")?;

        if let RouterState::Resolved { instances, .. } = &mut self.state {
            instances.extend(vms);
        }
        Ok(())
    }

    /// Delete the VR. No-op if unresolved.
    pub async fn delete(&mut self) -> Result<()> {
        let Some(id) = self.id() else {
            return Ok(());
        };

        tracing::info!("Deleting VR {}", self.name);
        self.client
            .delete(ResourceKind::VirtualRouter, id)
            .await
            .context("delete VR")?;
        self.state = RouterState::Unresolved;
        Ok(())
    }
}

fn floating_nic(network: &NetworkSpec, floating_only: bool) -> Section {
    let mut nic = Section::new(NIC_SECTION);
    nic.add_pair(keys::NETWORK, network.name.as_str());
    nic.add_pair(keys::FLOATING_IP, keys::YES);
    nic.add_pair(
        keys::FLOATING_ONLY,
        if floating_only { keys::YES } else { keys::NO },
    );
    match network.floating_ip.as_deref() {
        Some(ip) if ip.parse::<IpAddr>().is_ok() => nic.add_pair(keys::IP, ip),
        Some(ip) => tracing::warn!(
            "Ignoring invalid floating IP {:?} for network {}",
            ip,
            network.name
        ),
        None => {}
    }
    nic
}
