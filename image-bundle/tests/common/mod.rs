#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image_bundle::{
    BundleConfig, BundleOrchestrator, CloudClient, ImageSummary, InstanceMetadata, RegisterImageParams,
    SnapshotOptions, SnapshotState, StaticMetadataSource, VolumeAttachment,
};

pub const INSTANCE: &str = "i-0123456789abcdef0";
pub const ROOT_VOLUME: &str = "vol-0root";
pub const SNAPSHOT: &str = "snap-0new";
pub const IMAGE: &str = "ami-0new";

/// Every collaborator call the fake saw, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    ListAttachments(String),
    CreateSnapshot(String, SnapshotOptions),
    SnapshotState(String),
    CreateImage(RegisterImageParams),
    FindImage(String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Call::CreateSnapshot(..) | Call::CreateImage(_))
    }
}

/// Scripted responses for one bundle run.
#[derive(Clone, Debug)]
pub struct Script {
    pub attachments: Vec<VolumeAttachment>,
    /// Snapshot state answers in order; the last one repeats.
    pub snapshot_states: Vec<Result<SnapshotState, String>>,
    /// Number of image lookups that find nothing before the image shows up.
    /// `None` means it never shows up.
    pub image_hidden_for: Option<u32>,
    pub fail_create_snapshot: bool,
    pub fail_create_image: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            attachments: vec![
                VolumeAttachment { volume_id: ROOT_VOLUME.into(), device: "/dev/sda1".into() },
                VolumeAttachment { volume_id: "vol-0data".into(), device: "/dev/sdf".into() },
            ],
            snapshot_states: vec![Ok(SnapshotState::Available)],
            image_hidden_for: Some(0),
            fail_create_snapshot: false,
            fail_create_image: false,
        }
    }
}

#[derive(Clone)]
pub struct FakeCloud {
    pub script: Script,
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeCloud {
    pub fn new(script: Script) -> Self {
        Self { script, calls: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call.clone());
        calls
            .iter()
            .filter(|c| std::mem::discriminant(*c) == std::mem::discriminant(&call))
            .count()
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn list_volume_attachments(&self, instance_id: &str) -> Result<Vec<VolumeAttachment>> {
        self.record(Call::ListAttachments(instance_id.into()));
        Ok(self.script.attachments.clone())
    }

    async fn create_snapshot(&self, volume_id: &str, opts: &SnapshotOptions) -> Result<String> {
        self.record(Call::CreateSnapshot(volume_id.into(), opts.clone()));
        if self.script.fail_create_snapshot {
            return Err(anyhow!("SnapshotCreationPerVolumeRateExceeded"));
        }
        Ok(SNAPSHOT.into())
    }

    async fn get_snapshot_state(&self, snapshot_id: &str) -> Result<SnapshotState> {
        let n = self.record(Call::SnapshotState(snapshot_id.into()));
        let states = &self.script.snapshot_states;
        let answer = states.get(n - 1).or_else(|| states.last()).cloned();
        match answer {
            Some(Ok(state)) => Ok(state),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(SnapshotState::Pending),
        }
    }

    async fn create_image(&self, params: &RegisterImageParams) -> Result<String> {
        self.record(Call::CreateImage(params.clone()));
        if self.script.fail_create_image {
            return Err(anyhow!("InvalidSnapshot.NotFound"));
        }
        Ok(IMAGE.into())
    }

    async fn find_image_by_resource_id(&self, image_id: &str) -> Result<Option<ImageSummary>> {
        let n = self.record(Call::FindImage(image_id.into())) as u32;
        let visible = matches!(self.script.image_hidden_for, Some(hidden) if n > hidden);
        Ok(visible.then(|| ImageSummary {
            id: image_id.into(),
            name: Some("web-base".into()),
        }))
    }
}

pub fn metadata() -> InstanceMetadata {
    InstanceMetadata {
        instance_id: Some(INSTANCE.into()),
        availability_zone: Some("us-east-1a".into()),
        virtualization_type: Some("hvm".into()),
        kernel_id: None,
    }
}

pub fn orchestrator(cloud: &FakeCloud, config: BundleConfig) -> BundleOrchestrator {
    orchestrator_with(cloud, metadata(), config)
}

pub fn orchestrator_with(cloud: &FakeCloud, md: InstanceMetadata, config: BundleConfig) -> BundleOrchestrator {
    BundleOrchestrator::new(
        Arc::new(cloud.clone()),
        Arc::new(StaticMetadataSource(md)),
        config,
    )
}
