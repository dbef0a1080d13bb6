use nebulaflow_cloud::testing::FakeControlPlane;
use nebulaflow_cloud::{ControlPlane, ResourceId};
use nebulaflow_cloud_opennebula::{NetworkSpec, VirtualRouterSpec};
use std::sync::Arc;

#[allow(dead_code)]
pub const NODE_TEMPLATE: &str = "capone-node";
#[allow(dead_code)]
pub const ROUTER_TEMPLATE: &str = "capone-vr";

#[allow(dead_code)]
pub struct TestCloud {
    pub fake: Arc<FakeControlPlane>,
    pub public_network: ResourceId,
    pub private_network: ResourceId,
}

impl TestCloud {
    /// Fake control plane with a `service` and a `private` network and the
    /// node and router catalog templates
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let fake = Arc::new(FakeControlPlane::new());
        let public_network = fake.seed_network("service", "10.2.11.100", 16);
        let private_network = fake.seed_network("private", "192.168.150.10", 32);
        fake.seed_template(
            NODE_TEMPLATE,
            r#"
            CPU = "1"
            MEMORY = "2048"
            CONTEXT = [
              NETWORK = "YES",
              SSH_PUBLIC_KEY = "$USER[SSH_PUBLIC_KEY]" ]
            NIC = [ NETWORK = "service" ]
            "#,
        );
        fake.seed_template(
            ROUTER_TEMPLATE,
            r#"
            CPU = "1"
            MEMORY = "512"
            CONTEXT = [ NETWORK = "YES" ]
            "#,
        );

        Self {
            fake,
            public_network,
            private_network,
        }
    }

    pub fn client(&self) -> Arc<dyn ControlPlane> {
        self.fake.clone()
    }
}

#[allow(dead_code)]
pub fn public_network() -> NetworkSpec {
    NetworkSpec::new("service")
}

#[allow(dead_code)]
pub fn private_network() -> NetworkSpec {
    NetworkSpec::new("private")
}

#[allow(dead_code)]
pub fn router_spec(listener_ports: &[u16]) -> VirtualRouterSpec {
    VirtualRouterSpec {
        template_name: ROUTER_TEMPLATE.to_string(),
        listener_ports: listener_ports.to_vec(),
        ..VirtualRouterSpec::default()
    }
}
