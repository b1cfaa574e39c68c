//! Bundles a running EC2 instance into a new EBS-backed image.
//!
//! A run snapshots the instance's root volume, registers an image from the
//! snapshot and blocks until the image is listed. See [`BundleOrchestrator`].

pub mod cloud;
pub mod config;
pub mod error;
pub mod metadata;
pub mod orchestrator;
pub mod out;
pub mod poll;
pub mod stages;
pub mod state;
pub mod types;
pub mod utils;

pub use cloud::{CloudClient, Ec2CloudClient, RegisterVia};
pub use config::BundleConfig;
pub use error::{BundleError, Leftover};
pub use metadata::{CacheFileMetadataSource, EnvMetadataSource, MetadataSource, StaticMetadataSource};
pub use orchestrator::BundleOrchestrator;
pub use poll::{wait_until, PollError, PollSettings};
pub use state::BundleState;
pub use types::*;
