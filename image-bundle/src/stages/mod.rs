//! The two provider-facing steps of a bundle run.
//!
//! ```text
//! SnapshotStage ──(snapshot id, root device)──→ RegistrationStage ──→ image id
//! ```

mod registration;
mod snapshot;

pub use registration::{build_register_params, RegistrationStage};
pub use snapshot::SnapshotStage;
