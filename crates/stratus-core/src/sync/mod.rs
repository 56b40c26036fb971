//! Sync engine: checksums, conflict resolution, the coordinator and its gate.

pub mod checksum;
mod coordinator;
mod gate;
mod progress;
mod resolver;
mod scheduler;

pub use checksum::{checksum, ChecksumAlgorithm};
pub use coordinator::{SyncAction, SyncCoordinator, SyncOptions, SyncResult, SyncStats};
pub use gate::{SyncGate, SyncSession, SyncTrigger};
pub use progress::{ProgressCallback, ProgressReporter, SyncProgress, SyncStage};
pub use resolver::{has_local_changes, resolve, MergeStrategy, Resolution};
pub use scheduler::spawn_periodic_sync;
