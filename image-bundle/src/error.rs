//! Error taxonomy for a bundle run.
//!
//! Every variant is terminal for the run that produced it. Variants raised
//! after a resource was created carry its identifier so the caller can clean
//! it up by hand.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum BundleError {
    /// No attachment of the instance matched the root device convention.
    #[error("no volume attached to {instance_id} at {device}; instance-store images are not supported")]
    RootVolumeNotFound { instance_id: String, device: String },

    /// A provider call failed and was not retried.
    #[error("provider call {operation} failed: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("snapshot {snapshot_id} not available after {waited:?}")]
    SnapshotTimeout { snapshot_id: String, waited: Duration },

    #[error("unable to register image from snapshot {snapshot_id}: {source}")]
    RegistrationFailed {
        snapshot_id: String,
        #[source]
        source: BoxError,
    },

    #[error("image {image_id} not discoverable after {waited:?}")]
    ImageDiscoveryTimeout {
        image_id: String,
        snapshot_id: String,
        waited: Duration,
    },

    #[error("availability zone is not known; load instance metadata before registering")]
    MissingRegionInfo,

    /// Neither the command line nor the metadata named the instance.
    #[error("instance id is not known; pass --instance-id")]
    UnknownInstance,

    #[error("instance metadata unavailable at {}: {reason}", .path.display())]
    MetadataUnavailable { path: PathBuf, reason: String },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("bundle cancelled")]
    Cancelled {
        snapshot_id: Option<String>,
        image_id: Option<String>,
    },
}

/// Resources a failed run left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leftover {
    pub snapshot_id: Option<String>,
    pub image_id: Option<String>,
}

impl Leftover {
    pub fn is_empty(&self) -> bool {
        self.snapshot_id.is_none() && self.image_id.is_none()
    }
}

impl BundleError {
    pub fn provider(operation: &'static str, source: impl Into<BoxError>) -> Self {
        BundleError::Provider { operation, source: source.into() }
    }

    pub fn leftover(&self) -> Leftover {
        match self {
            BundleError::SnapshotTimeout { snapshot_id, .. }
            | BundleError::RegistrationFailed { snapshot_id, .. } => Leftover {
                snapshot_id: Some(snapshot_id.clone()),
                image_id: None,
            },
            BundleError::ImageDiscoveryTimeout { image_id, snapshot_id, .. } => Leftover {
                snapshot_id: Some(snapshot_id.clone()),
                image_id: Some(image_id.clone()),
            },
            BundleError::Cancelled { snapshot_id, image_id } => Leftover {
                snapshot_id: snapshot_id.clone(),
                image_id: image_id.clone(),
            },
            _ => Leftover::default(),
        }
    }
}
