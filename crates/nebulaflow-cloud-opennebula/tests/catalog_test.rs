//! Image and VM template catalog entries

mod common;

use common::TestCloud;
use nebulaflow_cloud::testing::Call;
use nebulaflow_cloud::{CloudError, ResourceKind};
use nebulaflow_cloud_opennebula::{Images, OneError, Templates};
use tokio_test::{assert_err, assert_ok};

const IMAGE_CONTENT: &str = r#"
PATH = "https://d24fmfybwxpuhu.cloudfront.net/ubuntu2204-7.0.0-0.qcow2"
DEV_PREFIX = "vd"
"#;

#[tokio::test]
async fn test_template_with_same_tag_is_kept() {
    let cloud = TestCloud::new();
    let templates = Templates::new(cloud.client(), "cluster-A");

    assert_ok!(templates.ensure_template("cp", "CPU = 1").await);
    let created = cloud.fake.info(ResourceKind::Template, "cp").unwrap();
    assert_eq!(created.template.get("CLUSTER_UID"), Some("cp-cluster-A"));
    assert_eq!(created.template.get("CPU"), Some("1"));
    cloud.fake.clear_calls();

    assert_ok!(templates.ensure_template("cp", "CPU = 1").await);

    assert!(cloud.fake.mutations().is_empty());
    assert_eq!(cloud.fake.info(ResourceKind::Template, "cp").unwrap().id, created.id);
}

#[tokio::test]
async fn test_template_with_other_tag_is_replaced() {
    let cloud = TestCloud::new();
    assert_ok!(
        Templates::new(cloud.client(), "cluster-A")
            .ensure_template("cp", "CPU = 1")
            .await
    );
    let stale = cloud.fake.info(ResourceKind::Template, "cp").unwrap();
    cloud.fake.clear_calls();

    let templates = Templates::new(cloud.client(), "cluster-B");
    assert_ok!(templates.ensure_template("cp", "CPU = 2").await);

    assert_eq!(
        cloud.fake.mutations(),
        vec![
            Call::Delete {
                kind: ResourceKind::Template,
                id: stale.id
            },
            Call::Create {
                kind: ResourceKind::Template,
                name: "cp".to_string()
            },
        ]
    );
    let fresh = cloud.fake.info(ResourceKind::Template, "cp").unwrap();
    assert_ne!(fresh.id, stale.id);
    assert_eq!(fresh.template.get("CLUSTER_UID"), Some("cp-cluster-B"));
    assert_eq!(fresh.template.get("CPU"), Some("2"));

    cloud.fake.clear_calls();
    assert_ok!(templates.ensure_template("cp", "CPU = 2").await);
    assert!(cloud.fake.mutations().is_empty());
}

#[tokio::test]
async fn test_untagged_template_is_replaced() {
    let cloud = TestCloud::new();
    cloud.fake.seed_template("cp", "CPU = 4");

    assert_ok!(
        Templates::new(cloud.client(), "cluster-A")
            .ensure_template("cp", "CPU = 1")
            .await
    );

    let template = cloud.fake.info(ResourceKind::Template, "cp").unwrap();
    assert_eq!(template.template.get("CLUSTER_UID"), Some("cp-cluster-A"));
    assert_eq!(template.template.get("CPU"), Some("1"));
}

#[tokio::test]
async fn test_invalid_template_content() {
    let cloud = TestCloud::new();
    let err = assert_err!(
        Templates::new(cloud.client(), "cluster-A")
            .ensure_template("cp", "CPU = [ 1")
            .await
    );
    assert!(err.to_string().starts_with("Failed to create VM template"));
    let OneError::Operation { source, .. } = &err else {
        panic!("expected an operation error, got {err:?}");
    };
    assert!(matches!(
        **source,
        OneError::Cloud(CloudError::InvalidTemplate { line: 1, .. })
    ));
    assert!(cloud.fake.info(ResourceKind::Template, "cp").is_none());
}

#[tokio::test]
async fn test_ensure_image() {
    let cloud = TestCloud::new();
    let images = Images::new(cloud.client());

    assert_ok!(images.ensure_image("ubuntu", IMAGE_CONTENT).await);
    let err = assert_err!(images.ensure_image("debian", "PATH = [").await);
    assert!(err.to_string().starts_with("Failed to create image"));
    assert!(cloud.fake.info(ResourceKind::Image, "debian").is_none());
    let image = cloud.fake.info(ResourceKind::Image, "ubuntu").unwrap();
    assert_eq!(image.template.get("NAME"), Some("ubuntu"));
    assert_eq!(image.template.get("DEV_PREFIX"), Some("vd"));
    cloud.fake.clear_calls();

    assert_ok!(images.ensure_image("ubuntu", IMAGE_CONTENT).await);
    assert!(cloud.fake.mutations().is_empty());
}

#[tokio::test]
async fn test_image_ready() {
    let cloud = TestCloud::new();
    let images = Images::new(cloud.client());
    assert_ok!(images.ensure_image("ubuntu", IMAGE_CONTENT).await);
    let id = cloud.fake.info(ResourceKind::Image, "ubuntu").unwrap().id;

    assert!(assert_ok!(images.image_ready("ubuntu").await));

    // USED
    cloud.fake.set_state(ResourceKind::Image, id, 2);
    assert!(assert_ok!(images.image_ready("ubuntu").await));

    // LOCKED while uploading
    cloud.fake.set_state(ResourceKind::Image, id, 4);
    assert!(!assert_ok!(images.image_ready("ubuntu").await));

    // ERROR
    cloud.fake.set_state(ResourceKind::Image, id, 5);
    assert!(!assert_ok!(images.image_ready("ubuntu").await));
}

#[tokio::test]
async fn test_image_ready_missing_is_error() {
    let cloud = TestCloud::new();
    let err = assert_err!(Images::new(cloud.client()).image_ready("ubuntu").await);
    assert!(err.is_not_found());
    assert!(err.to_string().starts_with("Failed to find image"));
}
