//! Machine reconciler

use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::instance::Instance;
use crate::model::{MachineRequest, MachineSpec};
use nebulaflow_cloud::{ControlPlane, Reconciled};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    pub ready: bool,

    /// Primary address, used as both the internal and external address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    #[serde(rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

pub struct MachineReconciler {
    client: Arc<dyn ControlPlane>,
    config: ReconcileConfig,
}

impl MachineReconciler {
    pub fn new(client: Arc<dyn ControlPlane>, config: ReconcileConfig) -> Self {
        Self { client, config }
    }

    pub async fn reconcile(&self, request: &MachineRequest) -> Result<Reconciled<MachineStatus>> {
        let machine = &request.machine;
        let mut instance = Instance::new(self.client.clone()).with_name(machine.name.as_str());

        // Already provisioned: the VM must still be there.
        if machine.provider_id.is_some() {
            instance.resolve_by_name(&machine.name).await?;
            return Ok(Reconciled::done(status_of(&instance)));
        }

        let Some(bootstrap_data) = request.bootstrap_data.as_deref() else {
            tracing::info!("Waiting for bootstrap data of machine {}", machine.name);
            return Ok(Reconciled::requeue(
                MachineStatus::default(),
                self.config.requeue_after(),
            ));
        };

        if !instance.resolve_if_exists(&machine.name).await? {
            let user_data = match &machine.user_data {
                Some(extra) => format!("{}\n{}", bootstrap_data, extra),
                None => bootstrap_data.to_string(),
            };
            instance
                .create_from_catalog(
                    &machine.template_name,
                    Some(&user_data),
                    request.network.as_ref(),
                    request.router.as_ref(),
                )
                .await?;
        } else if let Some(router) = &request.router {
            // A previous call may have failed between create and registration.
            if instance.needs_backend_registration() {
                instance.register_backend(router).await?;
            }
        }

        Ok(Reconciled::done(status_of(&instance)))
    }

    /// Terminate the machine's VM if it exists
    pub async fn reconcile_delete(&self, machine: &MachineSpec) -> Result<()> {
        let mut instance = Instance::new(self.client.clone());
        if instance.resolve_if_exists(&machine.name).await? {
            instance.delete().await?;
        }
        Ok(())
    }
}

fn status_of(instance: &Instance) -> MachineStatus {
    MachineStatus {
        ready: instance.exists(),
        address: instance.address().map(str::to_string),
        node_name: instance.node_name(),
        provider_id: instance.provider_id(),
    }
}
