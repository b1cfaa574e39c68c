use serde::{Deserialize, Serialize};

/// Device slot on the new image mapped to a local ephemeral store.
pub const EPHEMERAL_SLOTS: [(&str, &str); 4] = [
    ("/dev/sdb", "ephemeral0"),
    ("/dev/sdc", "ephemeral1"),
    ("/dev/sdd", "ephemeral2"),
    ("/dev/sde", "ephemeral3"),
];

pub const DEFAULT_ROOT_DEVICE: &str = "/dev/sda";
pub const DEFAULT_VIRTUALIZATION: &str = "pv";
pub const DEFAULT_ARCHITECTURE: &str = "x86_64";

/// Facts about the running instance, loaded once by a `MetadataSource`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub instance_id: Option<String>,
    pub availability_zone: Option<String>,
    pub virtualization_type: Option<String>,
    pub kernel_id: Option<String>,
}

/// Caller supplied naming for the snapshot and the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl BundleRequest {
    pub fn new(name: Option<String>, description: Option<String>) -> Self {
        // blank strings are treated as absent so they are never sent to the provider
        let keep = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Self { name: keep(name), description: keep(description) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotState {
    Pending,
    Available,
    Failed,
}

impl SnapshotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotState::Pending => "pending",
            SnapshotState::Available => "available",
            SnapshotState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the root volume for a single bundle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    pub id: String,
    pub volume_id: String,
    /// Device name the root volume is attached at, reused as the image root device.
    pub attachment_device: String,
    pub state: SnapshotState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Registering,
    Available,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub id: String,
    pub name: Option<String>,
    pub state: ImageState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleResult {
    pub image_id: String,
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// A volume attached to the instance being bundled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachment {
    pub volume_id: String,
    pub device: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    pub id: String,
    pub name: Option<String>,
}

/// Device slot on the new image backed by local instance storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralMapping {
    pub device: String,
    pub virtual_name: String,
}

impl EphemeralMapping {
    /// The fixed four-slot layout every registered image carries.
    pub fn fixed_slots() -> Vec<EphemeralMapping> {
        EPHEMERAL_SLOTS
            .iter()
            .map(|(device, virtual_name)| EphemeralMapping {
                device: device.to_string(),
                virtual_name: virtual_name.to_string(),
            })
            .collect()
    }
}

/// Everything the provider needs to register an image from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterImageParams {
    pub region: String,
    pub virtualization_type: String,
    pub kernel_id: Option<String>,
    pub snapshot_id: String,
    pub root_device_name: String,
    pub architecture: String,
    pub ephemeral_mappings: Vec<EphemeralMapping>,
    pub name: Option<String>,
    pub description: Option<String>,
}
