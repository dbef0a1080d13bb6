//! Compute instance handle

use crate::error::{OneError, Result, ResultExt};
use crate::keys;
use crate::lb;
use crate::model::{NetworkSpec, VirtualRouterSpec};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nebulaflow_cloud::{CONTEXT_SECTION, ControlPlane, ResourceId, ResourceKind, UpdateMode};
use std::sync::Arc;

/// Remote identity of an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Unresolved,
    Resolved {
        id: ResourceId,
        /// Primary address, from `CONTEXT/ETH0_IP`
        address: String,
        /// Whether the user template carries load balancer backend keys
        backend_registered: bool,
    },
}

/// A VM created from a catalog template
pub struct Instance {
    client: Arc<dyn ControlPlane>,
    name: Option<String>,
    state: InstanceState,
}

impl Instance {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self {
            client,
            name: None,
            state: InstanceState::Unresolved,
        }
    }

    /// Request an explicit VM name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn state(&self) -> &InstanceState {
        &self.state
    }

    pub fn exists(&self) -> bool {
        matches!(self.state, InstanceState::Resolved { .. })
    }

    pub fn id(&self) -> Option<ResourceId> {
        match &self.state {
            InstanceState::Resolved { id, .. } => Some(*id),
            InstanceState::Unresolved => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        match &self.state {
            InstanceState::Resolved { address, .. } => Some(address),
            InstanceState::Unresolved => None,
        }
    }

    /// Whether the instance is resolved but has not been registered with a
    /// load balancer yet
    pub fn needs_backend_registration(&self) -> bool {
        matches!(
            self.state,
            InstanceState::Resolved {
                backend_registered: false,
                ..
            }
        )
    }

    pub async fn resolve_by_id(&mut self, id: ResourceId) -> Result<()> {
        let info = self
            .client
            .fetch_info(ResourceKind::Vm, id)
            .await
            .context("fetch VM")?;

        let address = info
            .template
            .get_from_section(CONTEXT_SECTION, keys::ETH0_IP)
            .ok_or_else(|| {
                OneError::malformed(
                    ResourceKind::Vm,
                    id,
                    format!("{}/{}", CONTEXT_SECTION, keys::ETH0_IP),
                )
            })?
            .to_string();

        self.state = InstanceState::Resolved {
            id,
            address,
            backend_registered: info.template.get(lb::FIRST_BACKEND_HOST).is_some(),
        };
        Ok(())
    }

    /// Resolve by name. A missing VM is an error; see [`Instance::resolve_if_exists`].
    pub async fn resolve_by_name(&mut self, name: &str) -> Result<()> {
        let id = self
            .client
            .resolve_id_by_name(ResourceKind::Vm, name)
            .await
            .context("fetch VM")?;
        self.resolve_by_id(id).await?;
        self.name.get_or_insert_with(|| name.to_string());
        Ok(())
    }

    /// Resolve by name, leaving the handle unresolved if no such VM exists
    pub async fn resolve_if_exists(&mut self, name: &str) -> Result<bool> {
        match self.client.find_id_by_name(ResourceKind::Vm, name).await {
            Ok(Some(id)) => {
                self.resolve_by_id(id).await?;
                self.name.get_or_insert_with(|| name.to_string());
                Ok(true)
            }
            Ok(None) => {
                tracing::debug!("VM {} does not exist", name);
                self.state = InstanceState::Unresolved;
                Ok(false)
            }
            Err(e) => Err(e).context("fetch VM"),
        }
    }

    /// Create the VM from the catalog template `template_name`. No-op if the
    /// handle is already resolved.
    ///
    /// `network` overrides NIC 0. With a `router` the VM is flagged as a load
    /// balancer backend and, once its address is known, registered with every
    /// listener port.
    pub async fn create_from_catalog(
        &mut self,
        template_name: &str,
        user_data: Option<&str>,
        network: Option<&NetworkSpec>,
        router: Option<&VirtualRouterSpec>,
    ) -> Result<()> {
        if self.exists() {
            tracing::debug!("VM {} already exists", self.name.as_deref().unwrap_or_default());
            return Ok(());
        }

        let template_id = self
            .client
            .resolve_id_by_name(ResourceKind::Template, template_name)
            .await
            .context("find VM template")?;
        let mut template = self
            .client
            .fetch_info(ResourceKind::Template, template_id)
            .await
            .context("fetch VM template")?
            .template;
        template.remove(keys::CLUSTER_UID);

        // Without a requested name the control plane assigns one.
        match &self.name {
            Some(name) => template.set(keys::NAME, name.as_str()),
            None => {
                template.remove(keys::NAME);
            }
        }

        if let Some(network) = network {
            // Overwrite NIC 0, leave others intact.
            let nic = template.ensure_nic(0);
            nic.set(keys::NETWORK, network.name.as_str());
            if let Some(gateway) = &network.gateway {
                nic.set(keys::GATEWAY, gateway.as_str());
            }
            if let Some(dns) = &network.dns {
                nic.set(keys::DNS, dns.as_str());
            }
        }

        let mut context = Vec::new();
        if router.is_some() {
            context.push((keys::BACKEND, keys::YES.to_string()));
        }
        if let Some(user_data) = user_data {
            context.push((keys::USER_DATA_ENCODING, "base64".to_string()));
            context.push((keys::USER_DATA, STANDARD.encode(user_data)));
        }
        template.ensure_section(CONTEXT_SECTION).upsert(context);

        tracing::info!(
            "Creating VM {} from template {}",
            self.name.as_deref().unwrap_or_default(),
            template_name
        );
        let id = self
            .client
            .create(ResourceKind::Vm, &template)
            .await
            .context("create VM")?;
        self.resolve_by_id(id).await.context("create VM")?;

        if let Some(router) = router {
            self.register_backend(router).await?;
        }
        Ok(())
    }

    /// Register the resolved VM as a backend for every listener port of
    /// `router`. Safe to re-run: the update replaces the same keys.
    pub async fn register_backend(&mut self, router: &VirtualRouterSpec) -> Result<()> {
        let InstanceState::Resolved {
            id,
            address,
            backend_registered,
        } = &mut self.state
        else {
            return Err(OneError::InvalidConfig(
                "cannot register a VM that does not exist as a backend".to_string(),
            ));
        };

        let update = lb::backend_params(&router.listener_ports, address);
        tracing::info!("Registering VM {} ({}) as load balancer backend", id, address);
        self.client
            .update(ResourceKind::Vm, *id, &update, UpdateMode::Merge)
            .await
            .context("update VM")?;
        *backend_registered = true;
        Ok(())
    }

    /// Terminate the VM. No-op if unresolved.
    pub async fn delete(&mut self) -> Result<()> {
        let Some(id) = self.id() else {
            return Ok(());
        };

        tracing::info!("Terminating VM {}", id);
        self.client
            .delete(ResourceKind::Vm, id)
            .await
            .context("delete VM")?;
        self.state = InstanceState::Unresolved;
        Ok(())
    }

    /// Kubernetes node name: the VM name, or one derived from its address
    pub fn node_name(&self) -> Option<String> {
        let address = self.address()?;
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => Some(name.to_string()),
            _ => Some(format!("ip-{}", address.replace('.', "-"))),
        }
    }

    /// Kubernetes provider id (`one://<id>`)
    pub fn provider_id(&self) -> Option<String> {
        self.id().map(|id| format!("one://{}", id))
    }
}
