//! The sync engine: drift classification, event attribution and the state
//! machine that ties them to an engine and a session.

mod drift;
mod guard;
mod machine;

pub use drift::{evaluate, DriftAction, DriftInput, DriftThresholds};
pub use guard::UpdateDiscriminator;
pub use machine::{SnapshotOutcome, SyncMachine, SyncPhase};
