//! Instance metadata sources.
//!
//! Managed instances carry a metadata cache written at boot. The cache is a
//! shell fragment of `export KEY='value'` lines; the keys below are the only
//! ones the bundler reads.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::BundleError;
use crate::types::InstanceMetadata;
use crate::utils::{env_opt, non_blank};

pub const DEFAULT_METADATA_FILE: &str = "/var/spool/cloud/meta-data.sh";

pub const ZONE_KEY: &str = "EC2_PLACEMENT_AVAILABILITY_ZONE";
pub const KERNEL_KEY: &str = "EC2_KERNEL_ID";
pub const INSTANCE_KEY: &str = "EC2_INSTANCE_ID";
pub const VIRTUALIZATION_KEY: &str = "VIRTUALIZATION";

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn load(&self) -> Result<InstanceMetadata, BundleError>;
}

/// Reads the boot-time metadata cache. `VIRTUALIZATION` from the process
/// environment overrides the file.
pub struct CacheFileMetadataSource {
    path: PathBuf,
}

impl CacheFileMetadataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for CacheFileMetadataSource {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_FILE)
    }
}

#[async_trait]
impl MetadataSource for CacheFileMetadataSource {
    async fn load(&self) -> Result<InstanceMetadata, BundleError> {
        let data = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            let reason = if e.kind() == std::io::ErrorKind::NotFound {
                "not a managed instance, or the metadata cache was already cleaned up".to_string()
            } else {
                e.to_string()
            };
            BundleError::MetadataUnavailable { path: self.path.clone(), reason }
        })?;

        let mut vars = parse_metadata_cache(&data);
        let mut md = InstanceMetadata {
            instance_id: vars.remove(INSTANCE_KEY),
            availability_zone: vars.remove(ZONE_KEY),
            virtualization_type: vars.remove(VIRTUALIZATION_KEY),
            kernel_id: vars.remove(KERNEL_KEY),
        };
        if let Some(v) = env_opt(VIRTUALIZATION_KEY) {
            md.virtualization_type = Some(v);
        }
        tracing::debug!(path = %self.path.display(), ?md, "loaded instance metadata");
        Ok(md)
    }
}

/// Metadata taken straight from the process environment.
#[derive(Default)]
pub struct EnvMetadataSource;

#[async_trait]
impl MetadataSource for EnvMetadataSource {
    async fn load(&self) -> Result<InstanceMetadata, BundleError> {
        Ok(InstanceMetadata {
            instance_id: env_opt(INSTANCE_KEY),
            availability_zone: env_opt(ZONE_KEY),
            virtualization_type: env_opt(VIRTUALIZATION_KEY),
            kernel_id: env_opt(KERNEL_KEY),
        })
    }
}

pub struct StaticMetadataSource(pub InstanceMetadata);

#[async_trait]
impl MetadataSource for StaticMetadataSource {
    async fn load(&self) -> Result<InstanceMetadata, BundleError> {
        Ok(self.0.clone())
    }
}

/// Parses the cache with dotenv rules (`export ` prefix, quoting, comments).
/// Lines that do not parse are skipped; blank values are dropped.
pub fn parse_metadata_cache(data: &str) -> HashMap<String, String> {
    dotenvy::from_read_iter(data.as_bytes())
        .filter_map(|item| match item {
            Ok((key, value)) => non_blank(value).map(|v| (key, v)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparsable metadata line");
                None
            }
        })
        .collect()
}
