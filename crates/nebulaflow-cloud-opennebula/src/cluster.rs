//! Cluster reconciler
//!
//! Converges the shared infrastructure of a workload cluster: catalog images
//! and templates, and the control plane load balancer. The returned status
//! carries the values derived from the load balancer (endpoint host, private
//! network addresses) for the host to persist.

use crate::catalog::{Images, Templates};
use crate::cleanup::Cleanup;
use crate::config::ReconcileConfig;
use crate::error::{OneError, Result};
use crate::model::{ApiEndpoint, ClusterSpec, NetworkSpec};
use crate::router::Router;
use nebulaflow_cloud::{ControlPlane, Reconciled};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// Addresses on the private network, taken from the desired network or derived from the
/// load balancer's floating address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAddresses {
    #[serde(rename = "floatingIP", skip_serializing_if = "Option::is_none")]
    pub floating_ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub ready: bool,

    /// Effective endpoint, set once ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_network: Option<NetworkAddresses>,

    /// Floating addresses of the load balancer, public first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub floating_ips: Vec<String>,
}

pub struct ClusterReconciler {
    client: Arc<dyn ControlPlane>,
    config: ReconcileConfig,
}

impl ClusterReconciler {
    pub fn new(client: Arc<dyn ControlPlane>, config: ReconcileConfig) -> Self {
        Self { client, config }
    }

    pub async fn reconcile(&self, cluster: &ClusterSpec) -> Result<Reconciled<ClusterStatus>> {
        tracing::debug!("Reconciling cluster {}", cluster.name);
        let mut status = ClusterStatus::default();

        if !self.ensure_images(cluster).await? {
            tracing::info!("Waiting for images of cluster {}", cluster.name);
            return Ok(Reconciled::requeue(status, self.config.requeue_after()));
        }

        let templates = Templates::new(self.client.clone(), cluster.uid.as_str());
        for template in &cluster.templates {
            if template.template_name.is_empty() || template.template_content.is_empty() {
                continue;
            }
            templates
                .ensure_template(&template.template_name, &template.template_content)
                .await?;
        }

        let mut endpoint = cluster.control_plane_endpoint.clone();

        if let Some(spec) = &cluster.virtual_router {
            let mut router = Router::new(self.client.clone(), cluster.router_name())
                .with_replicas(spec.replicas.unwrap_or(1));
            if router.resolve_if_exists().await? {
                router.ensure_instances(spec).await?;
            } else {
                router
                    .create_from_template(
                        spec,
                        cluster.public_network.as_ref(),
                        cluster.private_network.as_ref(),
                    )
                    .await?;
            }

            let floating_ips = router.floating_ips();
            if endpoint.host.is_empty() {
                if let Some(ip) = floating_ips.first().filter(|ip| ip.parse::<IpAddr>().is_ok()) {
                    tracing::info!(
                        "Using {} as control plane endpoint of cluster {}",
                        ip,
                        cluster.name
                    );
                    endpoint.host = ip.clone();
                }
            }

            if let Some(private) = &cluster.private_network {
                let index = usize::from(cluster.public_network.is_some());
                status.private_network = Some(derive_addresses(private, floating_ips.get(index)));
            }
            status.floating_ips = floating_ips.to_vec();
        } else if let Some(private) = &cluster.private_network {
            status.private_network = Some(derive_addresses(private, None));
        }

        if endpoint.host.is_empty() {
            return Err(OneError::InvalidConfig(
                "control plane endpoint host must not be empty".to_string(),
            ));
        }
        if endpoint.port == 0 {
            endpoint.port = self.config.control_plane_port;
        }

        status.control_plane_endpoint = Some(endpoint);
        status.ready = true;
        Ok(Reconciled::done(status))
    }

    /// Ensure every image exists and report whether all of them are usable
    async fn ensure_images(&self, cluster: &ClusterSpec) -> Result<bool> {
        let images = Images::new(self.client.clone());
        let mut ready = true;
        for image in &cluster.images {
            if image.image_name.is_empty() || image.image_content.is_empty() {
                continue;
            }
            images
                .ensure_image(&image.image_name, &image.image_content)
                .await?;
            // A readiness lookup failure counts as not ready yet.
            let image_ready = match images.image_ready(&image.image_name).await {
                Ok(image_ready) => image_ready,
                Err(e) => {
                    tracing::debug!("Image {} is not ready: {}", image.image_name, e);
                    false
                }
            };
            ready = ready && image_ready;
        }
        Ok(ready)
    }

    /// Delete the control plane load balancer, then the leftovers of the
    /// load balancer reservations
    pub async fn reconcile_delete(&self, cluster: &ClusterSpec) -> Result<()> {
        tracing::info!("Deleting infrastructure of cluster {}", cluster.name);

        if cluster.virtual_router.is_some() {
            let mut router = Router::new(self.client.clone(), cluster.router_name());
            if router.resolve_if_exists().await? {
                router.delete().await?;
            }
        }

        Cleanup::new(self.client.clone(), cluster.name.as_str())
            .run()
            .await
    }
}

/// Spec values win; unset ones fall back to the floating address
fn derive_addresses(network: &NetworkSpec, floating_ip: Option<&String>) -> NetworkAddresses {
    let floating_ip = network.floating_ip.clone().or_else(|| floating_ip.cloned());
    NetworkAddresses {
        gateway: network.gateway.clone().or_else(|| floating_ip.clone()),
        dns: network.dns.clone().or_else(|| floating_ip.clone()),
        floating_ip,
    }
}
