use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2 as ec2;
use aws_types::region::Region;
use ec2::types::{
    ArchitectureValues, BlockDeviceMapping, EbsBlockDevice, Filter, ResourceType, Tag,
    TagSpecification,
};
use tokio::process::Command;

use super::command::{parse_register_output, register_command_args, REGISTER_PROGRAM};
use super::{CloudClient, RegisterVia};
use crate::types::{ImageSummary, RegisterImageParams, SnapshotOptions, SnapshotState, VolumeAttachment};

/// `CloudClient` backed by the EC2 API.
pub struct Ec2CloudClient {
    client: ec2::Client,
    register_via: RegisterVia,
}

impl Ec2CloudClient {
    pub fn new(client: ec2::Client, register_via: RegisterVia) -> Self {
        Self { client, register_via }
    }

    /// Loads credentials from the environment. Without an explicit region the
    /// SDK's default provider chain decides.
    pub async fn connect(region: Option<String>, register_via: RegisterVia) -> Result<Self> {
        let conf = match region {
            Some(r) => {
                aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(r))
                    .load()
                    .await
            }
            None => aws_config::load_defaults(BehaviorVersion::latest()).await,
        };
        Ok(Self::new(ec2::Client::new(&conf), register_via))
    }

    fn filter(name: &str, value: &str) -> Filter {
        Filter::builder().name(name).values(value).build()
    }

    async fn register_with_api(&self, params: &RegisterImageParams) -> Result<String> {
        let root = BlockDeviceMapping::builder()
            .device_name(&params.root_device_name)
            .ebs(EbsBlockDevice::builder().snapshot_id(&params.snapshot_id).build())
            .build();

        // RegisterImage requires a name; fall back to one derived from the snapshot
        let name = params
            .name
            .clone()
            .unwrap_or_else(|| format!("bundle-{}", params.snapshot_id));

        let mut req = self
            .client
            .register_image()
            .name(name)
            .set_description(params.description.clone())
            .architecture(ArchitectureValues::from(params.architecture.as_str()))
            .virtualization_type(&params.virtualization_type)
            .root_device_name(&params.root_device_name)
            .set_kernel_id(params.kernel_id.clone())
            .block_device_mappings(root);
        for m in &params.ephemeral_mappings {
            req = req.block_device_mappings(
                BlockDeviceMapping::builder()
                    .device_name(&m.device)
                    .virtual_name(&m.virtual_name)
                    .build(),
            );
        }

        let resp = req.send().await.context("RegisterImage")?;
        resp.image_id()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("RegisterImage returned no image id"))
    }

    async fn register_with_cli(&self, params: &RegisterImageParams) -> Result<String> {
        let args = register_command_args(params);
        tracing::info!("running register image command");
        tracing::debug!(program = REGISTER_PROGRAM, ?args, "register command");

        let output = Command::new(REGISTER_PROGRAM)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("failed to spawn {REGISTER_PROGRAM}"))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::info!(output = %stdout.trim(), "{REGISTER_PROGRAM} finished");
        if !output.status.success() {
            bail!("{REGISTER_PROGRAM} exited with {}: {}", output.status, stderr.trim());
        }
        parse_register_output(&stdout)
            .ok_or_else(|| anyhow!("no image id in {REGISTER_PROGRAM} output: {}", stdout.trim()))
    }
}

pub fn snapshot_state_from_ec2(state: Option<&ec2::types::SnapshotState>) -> SnapshotState {
    use ec2::types::SnapshotState as Ec2State;
    match state {
        Some(Ec2State::Completed) => SnapshotState::Available,
        Some(Ec2State::Error) => SnapshotState::Failed,
        _ => SnapshotState::Pending,
    }
}

#[async_trait]
impl CloudClient for Ec2CloudClient {
    async fn list_volume_attachments(&self, instance_id: &str) -> Result<Vec<VolumeAttachment>> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let resp = self
                .client
                .describe_volumes()
                .filters(Self::filter("attachment.instance-id", instance_id))
                .set_next_token(token.clone())
                .send()
                .await
                .context("DescribeVolumes")?;

            for vol in resp.volumes() {
                let Some(volume_id) = vol.volume_id() else { continue };
                for a in vol.attachments() {
                    if a.instance_id() != Some(instance_id) {
                        continue;
                    }
                    if let Some(dev) = a.device() {
                        out.push(VolumeAttachment {
                            volume_id: volume_id.to_string(),
                            device: dev.to_string(),
                        });
                    }
                }
            }

            token = resp.next_token().map(|s| s.to_string());
            if token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn create_snapshot(&self, volume_id: &str, opts: &SnapshotOptions) -> Result<String> {
        let mut req = self
            .client
            .create_snapshot()
            .volume_id(volume_id)
            .set_description(opts.description.clone());
        if let Some(name) = &opts.name {
            req = req.tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Snapshot)
                    .tags(Tag::builder().key("Name").value(name).build())
                    .build(),
            );
        }
        let resp = req.send().await.context("CreateSnapshot")?;
        resp.snapshot_id()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("CreateSnapshot returned no snapshot id"))
    }

    async fn get_snapshot_state(&self, snapshot_id: &str) -> Result<SnapshotState> {
        let resp = self
            .client
            .describe_snapshots()
            .snapshot_ids(snapshot_id)
            .send()
            .await
            .context("DescribeSnapshots")?;
        let snap = resp
            .snapshots()
            .first()
            .ok_or_else(|| anyhow!("snapshot {snapshot_id} not visible yet"))?;
        Ok(snapshot_state_from_ec2(snap.state()))
    }

    async fn create_image(&self, params: &RegisterImageParams) -> Result<String> {
        match self.register_via {
            RegisterVia::Api => self.register_with_api(params).await,
            RegisterVia::Cli => self.register_with_cli(params).await,
        }
    }

    async fn find_image_by_resource_id(&self, image_id: &str) -> Result<Option<ImageSummary>> {
        let resp = self
            .client
            .describe_images()
            .filters(Self::filter("image-id", image_id))
            .send()
            .await
            .context("DescribeImages")?;
        Ok(resp.images().first().map(|img| ImageSummary {
            id: img.image_id().unwrap_or(image_id).to_string(),
            name: img.name().map(|s| s.to_string()),
        }))
    }
}
