//! Cluster teardown
//!
//! [`Cleanup`] removes the load balancer resources by their deterministic
//! names, independently of any live [`Router`](crate::Router) handle, so it
//! also works after a crash that left no handle behind. Order matters: the
//! router holds leases on both reservations and must go first.

use crate::error::{Result, ResultExt};
use nebulaflow_cloud::{ControlPlane, ResourceKind};
use std::sync::Arc;

pub struct Cleanup {
    client: Arc<dyn ControlPlane>,
    cluster_name: String,
}

impl Cleanup {
    pub fn new(client: Arc<dyn ControlPlane>, cluster_name: impl Into<String>) -> Self {
        Self {
            client,
            cluster_name: cluster_name.into(),
        }
    }

    pub fn lb_router_name(&self) -> String {
        format!("{}-lb", self.cluster_name)
    }

    pub fn private_reservation_name(&self) -> String {
        format!("{}-vr", self.cluster_name)
    }

    pub fn public_reservation_name(&self) -> String {
        format!("{}-lb", self.cluster_name)
    }

    /// Router, then private reservation, then public reservation
    pub async fn run(&self) -> Result<()> {
        self.delete_lb_router().await?;
        self.delete_private_reservation().await?;
        self.delete_public_reservation().await
    }

    pub async fn delete_lb_router(&self) -> Result<()> {
        let name = self.lb_router_name();
        let Some(id) = self
            .client
            .find_id_by_name(ResourceKind::VirtualRouter, &name)
            .await
            .context("find VR")?
        else {
            tracing::debug!("VR {} already deleted", name);
            return Ok(());
        };

        tracing::info!("Deleting VR {} ({})", name, id);
        match self.client.delete(ResourceKind::VirtualRouter, id).await {
            Err(e) if !e.is_not_found() => Err(e).context("delete VR"),
            _ => Ok(()),
        }
    }

    pub async fn delete_private_reservation(&self) -> Result<()> {
        self.delete_reservation(&self.private_reservation_name()).await
    }

    pub async fn delete_public_reservation(&self) -> Result<()> {
        self.delete_reservation(&self.public_reservation_name()).await
    }

    /// Release every leased address of the reservation, then delete it
    async fn delete_reservation(&self, name: &str) -> Result<()> {
        let Some(id) = self
            .client
            .find_id_by_name(ResourceKind::VirtualNetwork, name)
            .await
            .context("find VNet")?
        else {
            tracing::debug!("VNet {} already deleted", name);
            return Ok(());
        };

        let info = match self.client.fetch_info(ResourceKind::VirtualNetwork, id).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e).context("fetch VNet"),
        };

        for address in info.address_ranges.iter().flat_map(|ar| ar.leases.iter()) {
            tracing::info!("Releasing {} from VNet {}", address, name);
            self.client
                .release_lease(id, address)
                .await
                .context("release VNet lease")?;
        }

        tracing::info!("Deleting VNet {} ({})", name, id);
        match self.client.delete(ResourceKind::VirtualNetwork, id).await {
            Err(e) if !e.is_not_found() => Err(e).context("delete VNet"),
            _ => Ok(()),
        }
    }
}
