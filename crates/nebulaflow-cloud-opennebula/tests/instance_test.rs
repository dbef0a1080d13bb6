//! Instance handle against the in-memory control plane

mod common;

use common::{NODE_TEMPLATE, TestCloud, private_network, router_spec};
use nebulaflow_cloud::testing::{Call, FailPoint};
use nebulaflow_cloud::{CONTEXT_SECTION, ControlPlane, Document, ResourceKind, UpdateMode};
use nebulaflow_cloud_opennebula::{Instance, NetworkSpec, OneError};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_create_from_catalog() {
    let cloud = TestCloud::new();
    let mut network = private_network();
    network.gateway = Some("192.168.150.1".to_string());
    network.dns = Some("192.168.150.1".to_string());

    let mut instance = Instance::new(cloud.client()).with_name("c1-md-0");
    assert_ok!(
        instance
            .create_from_catalog(NODE_TEMPLATE, Some("#cloud-config"), Some(&network), None)
            .await
    );

    assert!(instance.exists());
    assert_eq!(instance.address(), Some("192.168.150.10"));
    assert_eq!(instance.node_name().as_deref(), Some("c1-md-0"));
    assert_eq!(instance.provider_id().as_deref(), Some("one://0"));

    let vm = cloud.fake.info(ResourceKind::Vm, "c1-md-0").unwrap();
    assert_eq!(vm.template.get("CPU"), Some("1"));
    assert_eq!(vm.template.nic_count(), 1);
    let nic = vm.template.locate_nic(0).unwrap();
    assert_eq!(nic.get("NETWORK"), Some("private"));
    assert_eq!(nic.get("GATEWAY"), Some("192.168.150.1"));
    assert_eq!(nic.get("DNS"), Some("192.168.150.1"));

    let context = vm.template.section(CONTEXT_SECTION).unwrap();
    assert_eq!(context.get("NETWORK"), Some("YES"));
    assert_eq!(context.get("USER_DATA_ENCODING"), Some("base64"));
    assert_eq!(context.get("USER_DATA"), Some("I2Nsb3VkLWNvbmZpZw=="));
    assert_eq!(context.get("BACKEND"), None);
}

#[tokio::test]
async fn test_create_keeps_catalog_nic_without_override() {
    let cloud = TestCloud::new();

    let mut instance = Instance::new(cloud.client()).with_name("c1-md-0");
    assert_ok!(instance.create_from_catalog(NODE_TEMPLATE, None, None, None).await);

    assert_eq!(instance.address(), Some("10.2.11.100"));
    let vm = cloud.fake.info(ResourceKind::Vm, "c1-md-0").unwrap();
    assert_eq!(vm.template.locate_nic(0).unwrap().get("NETWORK"), Some("service"));
    assert_eq!(vm.template.get_from_section(CONTEXT_SECTION, "USER_DATA"), None);
    assert_eq!(vm.template.get("CLUSTER_UID"), None);
}

#[tokio::test]
async fn test_unnamed_instances_derive_node_name_from_address() {
    let cloud = TestCloud::new();
    let network = private_network();

    let mut a = Instance::new(cloud.client());
    assert_ok!(
        a.create_from_catalog(NODE_TEMPLATE, None, Some(&network), None)
            .await
    );
    let mut b = Instance::new(cloud.client());
    assert_ok!(
        b.create_from_catalog(NODE_TEMPLATE, None, Some(&network), None)
            .await
    );

    assert_eq!(a.name(), None);
    assert_eq!(a.node_name().as_deref(), Some("ip-192-168-150-10"));
    assert_eq!(b.node_name().as_deref(), Some("ip-192-168-150-11"));
    // The catalog entry's name is not reused for the VMs.
    assert!(cloud.fake.info(ResourceKind::Vm, NODE_TEMPLATE).is_none());
    assert_eq!(cloud.fake.count(ResourceKind::Vm), 2);

    // Resolving by name records the name it was found under.
    let vm = assert_ok!(cloud.client().fetch_info(ResourceKind::Vm, a.id().unwrap()).await);
    let mut adopted = Instance::new(cloud.client());
    assert_ok!(adopted.resolve_by_name(&vm.name).await);
    assert_eq!(adopted.node_name(), Some(vm.name));
}

#[tokio::test]
async fn test_create_is_noop_when_resolved() {
    let cloud = TestCloud::new();
    let mut instance = Instance::new(cloud.client()).with_name("c1-md-0");
    assert_ok!(instance.create_from_catalog(NODE_TEMPLATE, None, None, None).await);
    cloud.fake.clear_calls();

    assert_ok!(instance.create_from_catalog(NODE_TEMPLATE, None, None, None).await);

    assert!(cloud.fake.calls().is_empty());
    assert_eq!(cloud.fake.count(ResourceKind::Vm), 1);
}

#[tokio::test]
async fn test_create_registers_backend() {
    let cloud = TestCloud::new();
    let router = router_spec(&[6443, 443]);

    let mut instance = Instance::new(cloud.client()).with_name("c1-cp-0");
    assert_ok!(
        instance
            .create_from_catalog(NODE_TEMPLATE, None, Some(&private_network()), Some(&router))
            .await
    );

    let id = instance.id().unwrap();
    assert_eq!(
        cloud.fake.mutations(),
        vec![
            Call::Create {
                kind: ResourceKind::Vm,
                name: "c1-cp-0".to_string()
            },
            Call::Update {
                kind: ResourceKind::Vm,
                id
            },
        ]
    );

    let vm = cloud.fake.info(ResourceKind::Vm, "c1-cp-0").unwrap();
    assert_eq!(vm.template.get_from_section(CONTEXT_SECTION, "BACKEND"), Some("YES"));
    assert_eq!(vm.template.get("ONEGATE_HAPROXY_LB0_PORT"), Some("443"));
    assert_eq!(vm.template.get("ONEGATE_HAPROXY_LB1_PORT"), Some("6443"));
    assert_eq!(vm.template.get("ONEGATE_HAPROXY_LB1_SERVER_HOST"), Some("192.168.150.10"));
    assert!(!instance.needs_backend_registration());
}

#[tokio::test]
async fn test_backend_registration_can_be_retried() {
    let cloud = TestCloud::new();
    let router = router_spec(&[]);
    cloud.fake.fail_next(FailPoint::Update(ResourceKind::Vm));

    let mut instance = Instance::new(cloud.client()).with_name("c1-cp-0");
    let err = assert_err!(
        instance
            .create_from_catalog(NODE_TEMPLATE, None, None, Some(&router))
            .await
    );
    assert!(err.to_string().starts_with("Failed to update VM"));
    assert_eq!(cloud.fake.count(ResourceKind::Vm), 1);

    // The next call adopts the VM and finishes the registration.
    let mut adopted = Instance::new(cloud.client());
    assert!(assert_ok!(adopted.resolve_if_exists("c1-cp-0").await));
    assert!(adopted.needs_backend_registration());
    assert_ok!(adopted.register_backend(&router).await);

    let vm = cloud.fake.info(ResourceKind::Vm, "c1-cp-0").unwrap();
    assert_eq!(vm.template.get("ONEGATE_HAPROXY_LB0_PORT"), Some("6443"));

    let mut again = Instance::new(cloud.client());
    assert_ok!(again.resolve_by_name("c1-cp-0").await);
    assert!(!again.needs_backend_registration());
}

#[tokio::test]
async fn test_resolve_missing() {
    let cloud = TestCloud::new();
    let mut instance = Instance::new(cloud.client());

    let err = assert_err!(instance.resolve_by_name("nope").await);
    assert!(err.is_not_found());
    assert!(err.to_string().starts_with("Failed to fetch VM"));

    assert!(!assert_ok!(instance.resolve_if_exists("nope").await));
    assert!(!instance.exists());
}

#[tokio::test]
async fn test_resolve_without_address_is_malformed() {
    let cloud = TestCloud::new();
    let mut instance = Instance::new(cloud.client()).with_name("c1-md-0");
    assert_ok!(instance.create_from_catalog(NODE_TEMPLATE, None, None, None).await);
    let id = instance.id().unwrap();

    let mut bare = Document::new();
    bare.add_pair("NAME", "c1-md-0");
    assert_ok!(
        cloud
            .client()
            .update(ResourceKind::Vm, id, &bare, UpdateMode::Replace)
            .await
    );

    let mut resolved = Instance::new(cloud.client());
    let err = assert_err!(resolved.resolve_by_id(id).await);
    assert!(matches!(err, OneError::Malformed { kind: ResourceKind::Vm, .. }));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_create_fails_on_missing_template() {
    let cloud = TestCloud::new();
    let mut instance = Instance::new(cloud.client());

    let err = assert_err!(
        instance
            .create_from_catalog("missing", None, Some(&NetworkSpec::new("private")), None)
            .await
    );
    assert!(err.is_not_found());
    assert!(err.to_string().starts_with("Failed to find VM template"));
    assert_eq!(cloud.fake.count(ResourceKind::Vm), 0);
}

#[tokio::test]
async fn test_delete() {
    let cloud = TestCloud::new();
    let mut instance = Instance::new(cloud.client()).with_name("c1-md-0");

    // Unresolved delete does nothing.
    assert_ok!(instance.delete().await);
    assert!(cloud.fake.mutations().is_empty());

    assert_ok!(instance.create_from_catalog(NODE_TEMPLATE, None, None, None).await);
    let id = instance.id().unwrap();
    assert_ok!(instance.delete().await);

    assert!(!instance.exists());
    assert_eq!(cloud.fake.count(ResourceKind::Vm), 0);
    assert_eq!(
        cloud.fake.mutations().last(),
        Some(&Call::Delete {
            kind: ResourceKind::Vm,
            id
        })
    );
}
