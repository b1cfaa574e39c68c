use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cloud::CloudClient;
use crate::error::BundleError;
use crate::poll::{wait_until, PollError, PollSettings};
use crate::types::{
    BundleRequest, EphemeralMapping, ImageHandle, ImageState, InstanceMetadata, RegisterImageParams,
    SnapshotHandle, DEFAULT_ARCHITECTURE, DEFAULT_VIRTUALIZATION,
};
use crate::utils::region_from_zone;

/// Registers an image from an available snapshot and waits until the
/// provider lists it.
pub struct RegistrationStage {
    cloud: Arc<dyn CloudClient>,
    poll: PollSettings,
    cancel: CancellationToken,
}

/// Builds registration parameters. Pure; the same inputs always yield the
/// same parameters.
pub fn build_register_params(
    snapshot: &SnapshotHandle,
    metadata: &InstanceMetadata,
    request: &BundleRequest,
) -> Result<RegisterImageParams, BundleError> {
    if snapshot.id.trim().is_empty() {
        return Err(BundleError::IllegalState(
            "snapshot id is empty; the snapshot stage must run before registration".into(),
        ));
    }

    let zone = metadata
        .availability_zone
        .as_deref()
        .ok_or(BundleError::MissingRegionInfo)?;
    let region = region_from_zone(zone).ok_or(BundleError::MissingRegionInfo)?;
    debug!(zone, region, "detected current region");

    Ok(RegisterImageParams {
        region: region.to_string(),
        virtualization_type: metadata
            .virtualization_type
            .clone()
            .unwrap_or_else(|| DEFAULT_VIRTUALIZATION.to_string()),
        // HVM images boot without a kernel id
        kernel_id: metadata.kernel_id.clone(),
        snapshot_id: snapshot.id.clone(),
        root_device_name: snapshot.attachment_device.clone(),
        architecture: DEFAULT_ARCHITECTURE.to_string(),
        ephemeral_mappings: EphemeralMapping::fixed_slots(),
        name: request.name.clone(),
        description: request.description.clone(),
    })
}

impl RegistrationStage {
    pub fn new(cloud: Arc<dyn CloudClient>, poll: PollSettings, cancel: CancellationToken) -> Self {
        Self { cloud, poll, cancel }
    }

    /// Submits the registration and waits for the new image to be listed.
    pub async fn register_image(
        &self,
        snapshot: &SnapshotHandle,
        metadata: &InstanceMetadata,
        request: &BundleRequest,
    ) -> Result<ImageHandle, BundleError> {
        let mut image = self.submit(snapshot, metadata, request).await?;
        self.wait_discoverable(&mut image, &snapshot.id).await?;
        Ok(image)
    }

    /// Issues the registration call and returns a handle in `Registering`.
    pub async fn submit(
        &self,
        snapshot: &SnapshotHandle,
        metadata: &InstanceMetadata,
        request: &BundleRequest,
    ) -> Result<ImageHandle, BundleError> {
        let params = build_register_params(snapshot, metadata, request)?;
        info!(
            snapshot_id = %params.snapshot_id,
            region = %params.region,
            virtualization = %params.virtualization_type,
            kernel = ?params.kernel_id,
            root_device = %params.root_device_name,
            "registering image"
        );

        let id = self
            .cloud
            .create_image(&params)
            .await
            .map_err(|e| BundleError::RegistrationFailed {
                snapshot_id: snapshot.id.clone(),
                source: e.into(),
            })?;
        info!(image_id = %id, "new image registered");

        Ok(ImageHandle {
            id,
            name: params.name,
            state: ImageState::Registering,
        })
    }

    /// Waits until the image can be found by its id. Being listed is the
    /// readiness signal; the image state itself is not checked.
    pub async fn wait_discoverable(&self, image: &mut ImageHandle, snapshot_id: &str) -> Result<(), BundleError> {
        let cloud = &self.cloud;
        let id = image.id.as_str();
        let interval = self.poll.interval;

        info!(image_id = id, "querying for the new image");
        let result = wait_until(self.poll, &self.cancel, || async move {
            match cloud.find_image_by_resource_id(id).await {
                Ok(Some(found)) => Some(found),
                Ok(None) => {
                    info!(image_id = id, "image not yet available, checking again in {interval:?}");
                    None
                }
                Err(e) => {
                    warn!(image_id = id, error = %e, "image lookup failed, retrying");
                    None
                }
            }
        })
        .await;

        match result {
            Ok(found) => {
                info!(image_id = %image.id, name = ?found.name, "found image");
                if image.name.is_none() {
                    image.name = found.name;
                }
                image.state = ImageState::Available;
                Ok(())
            }
            Err(PollError::DeadlineExceeded { elapsed }) => Err(BundleError::ImageDiscoveryTimeout {
                image_id: image.id.clone(),
                snapshot_id: snapshot_id.to_string(),
                waited: elapsed,
            }),
            Err(PollError::Cancelled) => Err(BundleError::Cancelled {
                snapshot_id: Some(snapshot_id.to_string()),
                image_id: Some(image.id.clone()),
            }),
        }
    }
}
