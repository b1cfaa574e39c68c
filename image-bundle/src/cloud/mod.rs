mod command;
mod ec2;

pub use command::{parse_register_output, register_command_args, REGISTER_PROGRAM};
pub use ec2::{snapshot_state_from_ec2, Ec2CloudClient};

use crate::types::{ImageSummary, RegisterImageParams, SnapshotOptions, SnapshotState, VolumeAttachment};
use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use std::sync::Arc;

/// Provider operations a bundle run needs. Every call is a network query.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn list_volume_attachments(&self, instance_id: &str) -> Result<Vec<VolumeAttachment>>;
    async fn create_snapshot(&self, volume_id: &str, opts: &SnapshotOptions) -> Result<String>;
    async fn get_snapshot_state(&self, snapshot_id: &str) -> Result<SnapshotState>;
    async fn create_image(&self, params: &RegisterImageParams) -> Result<String>;
    async fn find_image_by_resource_id(&self, image_id: &str) -> Result<Option<ImageSummary>>;
}

/// How `create_image` reaches the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum RegisterVia {
    #[default]
    Api,
    /// Shell out to the `ec2-register` tool.
    Cli,
}

pub async fn build_client(region: Option<String>, register_via: RegisterVia) -> Result<Arc<dyn CloudClient>> {
    let client = Ec2CloudClient::connect(region, register_via).await?;
    Ok(Arc::new(client))
}
