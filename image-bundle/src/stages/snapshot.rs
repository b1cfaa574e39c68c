use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cloud::CloudClient;
use crate::error::BundleError;
use crate::poll::{wait_until, PollError, PollSettings};
use crate::types::{BundleRequest, SnapshotHandle, SnapshotOptions, SnapshotState, VolumeAttachment};

/// Snapshots the root volume of an instance and waits until it is usable.
pub struct SnapshotStage {
    cloud: Arc<dyn CloudClient>,
    root_device: String,
    poll: PollSettings,
    cancel: CancellationToken,
}

impl SnapshotStage {
    pub fn new(
        cloud: Arc<dyn CloudClient>,
        root_device: impl Into<String>,
        poll: PollSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cloud,
            root_device: root_device.into(),
            poll,
            cancel,
        }
    }

    /// Finds the attachment whose device name contains the root device
    /// convention. The device name varies with hypervisor and kernel
    /// (`/dev/sda` vs `/dev/sda1`), hence the substring match.
    pub async fn resolve_root_volume(&self, instance_id: &str) -> Result<VolumeAttachment, BundleError> {
        info!(instance_id, device = %self.root_device, "locating root volume");
        let attachments = self
            .cloud
            .list_volume_attachments(instance_id)
            .await
            .map_err(|e| BundleError::provider("ListVolumeAttachments", e))?;

        let mut matching = attachments
            .into_iter()
            .filter(|a| a.device.contains(self.root_device.as_str()));
        let root = matching.next().ok_or_else(|| BundleError::RootVolumeNotFound {
            instance_id: instance_id.to_string(),
            device: self.root_device.clone(),
        })?;
        if let Some(extra) = matching.next() {
            warn!(
                chosen = %root.volume_id,
                ignored = %extra.volume_id,
                "more than one attachment matches the root device"
            );
        }
        info!(volume_id = %root.volume_id, device = %root.device, "found root volume");
        Ok(root)
    }

    pub async fn create_snapshot(
        &self,
        instance_id: &str,
        request: &BundleRequest,
    ) -> Result<SnapshotHandle, BundleError> {
        let root = self.resolve_root_volume(instance_id).await?;

        let opts = SnapshotOptions {
            name: request.name.clone(),
            description: request.description.clone(),
        };
        info!(volume_id = %root.volume_id, name = ?opts.name, "creating snapshot");
        let id = self
            .cloud
            .create_snapshot(&root.volume_id, &opts)
            .await
            .map_err(|e| BundleError::provider("CreateSnapshot", e))?;

        let mut handle = SnapshotHandle {
            id,
            volume_id: root.volume_id,
            attachment_device: root.device,
            state: SnapshotState::Pending,
        };
        info!(snapshot_id = %handle.id, "waiting for snapshot to become available");
        self.wait_available(&mut handle).await?;
        info!(snapshot_id = %handle.id, "snapshot is now available");
        Ok(handle)
    }

    /// Polls the snapshot until the provider reports it available. Only the
    /// handle's state is refreshed.
    pub async fn wait_available(&self, handle: &mut SnapshotHandle) -> Result<(), BundleError> {
        let cloud = &self.cloud;
        let id = handle.id.as_str();
        let interval = self.poll.interval;

        let result = wait_until(self.poll, &self.cancel, || async move {
            match cloud.get_snapshot_state(id).await {
                Ok(SnapshotState::Available) => Some(SnapshotState::Available),
                Ok(state) => {
                    info!(snapshot_id = id, %state, "snapshot not ready, checking again in {interval:?}");
                    None
                }
                Err(e) => {
                    warn!(snapshot_id = id, error = %e, "snapshot state query failed, retrying");
                    None
                }
            }
        })
        .await;

        match result {
            Ok(state) => {
                handle.state = state;
                Ok(())
            }
            Err(PollError::DeadlineExceeded { elapsed }) => Err(BundleError::SnapshotTimeout {
                snapshot_id: handle.id.clone(),
                waited: elapsed,
            }),
            Err(PollError::Cancelled) => Err(BundleError::Cancelled {
                snapshot_id: Some(handle.id.clone()),
                image_id: None,
            }),
        }
    }
}
