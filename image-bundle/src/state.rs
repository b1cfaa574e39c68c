//! Bundle lifecycle states.
//!
//! ```text
//! Idle → Snapshotting → Registering → Waiting → Done
//!   └──────────┴─────────────┴───────────┴────→ Failed
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleState {
    Idle,
    /// Root volume lookup, snapshot creation and snapshot polling.
    Snapshotting,
    /// Registration call in flight.
    Registering,
    /// Waiting for the new image to be listed.
    Waiting,
    Done,
    Failed,
}

impl BundleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BundleState::Done | BundleState::Failed)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            BundleState::Snapshotting | BundleState::Registering | BundleState::Waiting
        )
    }

    /// A new run may start from Idle or from a finished run.
    pub fn can_start(&self) -> bool {
        !self.is_in_progress()
    }

    pub fn can_transition_to(&self, target: BundleState) -> bool {
        use BundleState::*;
        matches!(
            (self, target),
            (Idle, Snapshotting)
                | (Snapshotting, Registering)
                | (Registering, Waiting)
                | (Waiting, Done)
                | (Idle | Snapshotting | Registering | Waiting, Failed)
        )
    }
}

impl std::fmt::Display for BundleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BundleState::Idle => "idle",
            BundleState::Snapshotting => "snapshotting",
            BundleState::Registering => "registering",
            BundleState::Waiting => "waiting",
            BundleState::Done => "done",
            BundleState::Failed => "failed",
        };
        f.write_str(s)
    }
}
