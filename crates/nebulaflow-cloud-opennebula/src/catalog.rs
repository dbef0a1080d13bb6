//! Catalog entries: disk images and VM templates

use crate::error::{OneError, Result, ResultExt};
use crate::keys;
use nebulaflow_cloud::{ControlPlane, Document, ResourceKind};
use std::sync::Arc;

/// Image state as reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Init,
    Ready,
    Used,
    Disabled,
    Locked,
    Error,
    Clone,
    Delete,
    UsedPersistent,
    LockedUsed,
    LockedUsedPersistent,
}

impl ImageState {
    pub fn from_code(code: i32) -> Option<Self> {
        let state = match code {
            0 => ImageState::Init,
            1 => ImageState::Ready,
            2 => ImageState::Used,
            3 => ImageState::Disabled,
            4 => ImageState::Locked,
            5 => ImageState::Error,
            6 => ImageState::Clone,
            7 => ImageState::Delete,
            8 => ImageState::UsedPersistent,
            9 => ImageState::LockedUsed,
            10 => ImageState::LockedUsedPersistent,
            _ => return None,
        };
        Some(state)
    }

    /// Whether VMs can be instantiated from the image
    pub fn is_usable(self) -> bool {
        matches!(self, ImageState::Ready | ImageState::Used)
    }
}

pub struct Images {
    client: Arc<dyn ControlPlane>,
}

impl Images {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self { client }
    }

    /// Create the image unless one with the same name exists
    pub async fn ensure_image(&self, name: &str, content: &str) -> Result<()> {
        if self
            .client
            .find_id_by_name(ResourceKind::Image, name)
            .await
            .context("find image")?
            .is_some()
        {
            tracing::debug!("Image {} already exists", name);
            return Ok(());
        }

        let mut image = Document::new();
        image.add_pair(keys::NAME, name);
        image.append(Document::parse(content).context("create image")?);

        tracing::info!("Creating image {}", name);
        self.client
            .create(ResourceKind::Image, &image)
            .await
            .context("create image")?;
        Ok(())
    }

    /// Whether the image is ready or already in use. Any other state is
    /// reported as not ready; failing to look the image up is an error.
    pub async fn image_ready(&self, name: &str) -> Result<bool> {
        let id = self
            .client
            .resolve_id_by_name(ResourceKind::Image, name)
            .await
            .context("find image")?;
        let info = self
            .client
            .fetch_info(ResourceKind::Image, id)
            .await
            .context("fetch image")?;

        let code = info
            .state
            .ok_or_else(|| OneError::malformed(ResourceKind::Image, id, "STATE"))?;
        let state = ImageState::from_code(code);
        tracing::debug!("Image {} is in state {:?}", name, state);
        Ok(state.is_some_and(ImageState::is_usable))
    }
}

/// VM templates owned by one cluster
pub struct Templates {
    client: Arc<dyn ControlPlane>,
    cluster_uid: String,
}

impl Templates {
    pub fn new(client: Arc<dyn ControlPlane>, cluster_uid: impl Into<String>) -> Self {
        Self {
            client,
            cluster_uid: cluster_uid.into(),
        }
    }

    /// Tag stored under `CLUSTER_UID` in the template named `name`
    pub fn tag_for(&self, name: &str) -> String {
        format!("{}-{}", name, self.cluster_uid)
    }

    /// Create the template, replacing a same-named one that carries another
    /// cluster's tag. A template with the expected tag is left untouched.
    pub async fn ensure_template(&self, name: &str, content: &str) -> Result<()> {
        let tag = self.tag_for(name);
        let content = Document::parse(content).context("create VM template")?;

        let existing = self
            .client
            .find_id_by_name(ResourceKind::Template, name)
            .await
            .context("find VM template")?;
        if let Some(id) = existing {
            let info = self
                .client
                .fetch_info(ResourceKind::Template, id)
                .await
                .context("fetch VM template")?;
            if info.template.get(keys::CLUSTER_UID) == Some(tag.as_str()) {
                tracing::debug!("VM template {} is up to date", name);
                return Ok(());
            }

            tracing::info!("Replacing stale VM template {} ({})", name, id);
            self.client
                .delete(ResourceKind::Template, id)
                .await
                .context("delete VM template")?;
        }

        let mut template = Document::new();
        template.add_pair(keys::NAME, name);
        template.add_pair(keys::CLUSTER_UID, tag);
        template.append(content);

        tracing::info!("Creating VM template {}", name);
        self.client
            .create(ResourceKind::Template, &template)
            .await
            .context("create VM template")?;
        Ok(())
    }
}
