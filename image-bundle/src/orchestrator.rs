//! Single entry point for a bundle run.
//!
//! Runs `SnapshotStage` then `RegistrationStage` strictly in sequence. A
//! failed stage aborts the run; nothing it created is rolled back, the error
//! names the leftovers instead.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cloud::{register_command_args, CloudClient};
use crate::config::BundleConfig;
use crate::error::BundleError;
use crate::metadata::MetadataSource;
use crate::stages::{build_register_params, RegistrationStage, SnapshotStage};
use crate::state::BundleState;
use crate::types::{BundleRequest, BundleResult, InstanceMetadata, SnapshotHandle, SnapshotState};
use crate::utils::region_from_zone;

pub const DRY_RUN_SNAPSHOT_ID: &str = "snap-dryrun";
pub const DRY_RUN_IMAGE_ID: &str = "ami-dryrun";

pub struct BundleOrchestrator {
    cloud: Arc<dyn CloudClient>,
    metadata: Arc<dyn MetadataSource>,
    config: BundleConfig,
    cancel: CancellationToken,
    state: BundleState,
    transitions: Vec<BundleState>,
}

impl BundleOrchestrator {
    pub fn new(cloud: Arc<dyn CloudClient>, metadata: Arc<dyn MetadataSource>, config: BundleConfig) -> Self {
        Self {
            cloud,
            metadata,
            config,
            cancel: CancellationToken::new(),
            state: BundleState::Idle,
            transitions: vec![BundleState::Idle],
        }
    }

    /// Replaces the token that aborts polling.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> BundleState {
        self.state
    }

    /// States visited by the latest run, starting with `Idle`.
    pub fn transitions(&self) -> &[BundleState] {
        &self.transitions
    }

    /// Snapshots `instance_id`, registers an image from the snapshot and
    /// waits until the image is listed.
    ///
    /// `&mut self` rules out overlapping runs. A state left in progress means
    /// the previous `run` future was dropped; that run is abandoned and the
    /// new one starts from `Idle` with fresh handles.
    pub async fn run(&mut self, instance_id: &str, request: &BundleRequest) -> Result<BundleResult, BundleError> {
        if !self.state.can_start() {
            warn!(state = %self.state, "previous bundle run was abandoned; anything it created is left in place");
        }
        self.state = BundleState::Idle;
        self.transitions = vec![BundleState::Idle];

        info!(instance_id, dry_run = self.config.dry_run, "starting bundle");
        let outcome = if self.config.dry_run {
            self.simulate(instance_id, request).await
        } else {
            self.execute(instance_id, request).await
        };

        match &outcome {
            Ok(result) => {
                self.transition(BundleState::Done)?;
                info!(image_id = %result.image_id, snapshot_id = %result.snapshot_id, "bundle complete");
            }
            Err(e) => {
                let leftover = e.leftover();
                error!(
                    error = %e,
                    state = %self.state,
                    snapshot_id = ?leftover.snapshot_id,
                    image_id = ?leftover.image_id,
                    "bundle failed"
                );
                self.transition(BundleState::Failed)?;
            }
        }
        outcome
    }

    async fn execute(&mut self, instance_id: &str, request: &BundleRequest) -> Result<BundleResult, BundleError> {
        let metadata = self.metadata.load().await?;
        // registration needs the region; fail before anything is created
        preflight(&metadata)?;
        self.ensure_not_cancelled(None)?;

        self.transition(BundleState::Snapshotting)?;
        let snapshots = SnapshotStage::new(
            self.cloud.clone(),
            self.config.root_device.clone(),
            self.config.poll,
            self.cancel.clone(),
        );
        let snapshot = snapshots.create_snapshot(instance_id, request).await?;
        self.ensure_not_cancelled(Some(&snapshot.id))?;

        self.transition(BundleState::Registering)?;
        let registration = RegistrationStage::new(self.cloud.clone(), self.config.poll, self.cancel.clone());
        let mut image = registration.submit(&snapshot, &metadata, request).await?;

        self.transition(BundleState::Waiting)?;
        registration.wait_discoverable(&mut image, &snapshot.id).await?;

        Ok(BundleResult {
            image_id: image.id,
            snapshot_id: snapshot.id,
            dry_run: false,
        })
    }

    /// Walks the stages without contacting the provider. Metadata is still
    /// loaded and registration parameters still built, so a dry run catches
    /// the same local configuration errors as a real one.
    async fn simulate(&mut self, instance_id: &str, request: &BundleRequest) -> Result<BundleResult, BundleError> {
        let metadata = self.metadata.load().await?;

        self.transition(BundleState::Snapshotting)?;
        info!(instance_id, device = %self.config.root_device, "dry run: skipping snapshot of root volume");
        let snapshot = SnapshotHandle {
            id: DRY_RUN_SNAPSHOT_ID.to_string(),
            volume_id: String::new(),
            attachment_device: self.config.root_device.clone(),
            state: SnapshotState::Available,
        };

        self.transition(BundleState::Registering)?;
        let params = build_register_params(&snapshot, &metadata, request)?;
        info!(args = ?register_command_args(&params), "dry run: skipping image registration");

        self.transition(BundleState::Waiting)?;
        info!("dry run: skipping wait for image");

        Ok(BundleResult {
            image_id: DRY_RUN_IMAGE_ID.to_string(),
            snapshot_id: snapshot.id,
            dry_run: true,
        })
    }

    fn ensure_not_cancelled(&self, snapshot_id: Option<&str>) -> Result<(), BundleError> {
        if self.cancel.is_cancelled() {
            return Err(BundleError::Cancelled {
                snapshot_id: snapshot_id.map(str::to_string),
                image_id: None,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: BundleState) -> Result<(), BundleError> {
        if !self.state.can_transition_to(next) {
            return Err(BundleError::IllegalState(format!(
                "cannot move from {} to {next}",
                self.state
            )));
        }
        info!(from = %self.state, to = %next, "bundle state");
        self.state = next;
        self.transitions.push(next);
        Ok(())
    }
}

fn preflight(metadata: &InstanceMetadata) -> Result<(), BundleError> {
    metadata
        .availability_zone
        .as_deref()
        .and_then(region_from_zone)
        .map(|_| ())
        .ok_or(BundleError::MissingRegionInfo)
}
