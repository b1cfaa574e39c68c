use std::time::Duration;

use crate::poll::PollSettings;
use crate::types::DEFAULT_ROOT_DEVICE;

/// Settings for one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    /// Device name convention of the root volume, matched as a substring.
    pub root_device: String,
    pub poll: PollSettings,
    /// Skip every provider call and simulate the stages.
    pub dry_run: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            root_device: DEFAULT_ROOT_DEVICE.to_string(),
            poll: PollSettings::default(),
            dry_run: false,
        }
    }
}

impl BundleConfig {
    pub fn with_root_device(mut self, device: impl Into<String>) -> Self {
        self.root_device = device.into();
        self
    }

    pub fn with_poll(mut self, deadline: Duration, interval: Duration) -> Self {
        self.poll = PollSettings::new(deadline, interval);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
