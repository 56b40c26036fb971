//! Local dataset and sync bookkeeping seams

use std::future::Future;

use crate::models::{Conflict, DatasetSnapshot, SyncConflict, SyncMetadata};
use crate::sync::MergeStrategy;
use crate::Result;

/// How one collection of an incoming snapshot lands locally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectionMode {
    /// Replace the local collection with the incoming one
    #[default]
    Overwrite,
    /// Upsert incoming entities and keep local-only ones
    Union,
}

/// Per-collection apply modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub notes: CollectionMode,
    pub conversations: CollectionMode,
    pub tags: CollectionMode,
    pub note_tags: CollectionMode,
}

impl ApplyOptions {
    /// Every collection replaced; used after a download or merge.
    #[must_use]
    pub const fn replace_all() -> Self {
        Self::uniform(CollectionMode::Overwrite)
    }

    /// Every collection unioned; used for imports.
    #[must_use]
    pub const fn union_all() -> Self {
        Self::uniform(CollectionMode::Union)
    }

    const fn uniform(mode: CollectionMode) -> Self {
        Self {
            notes: mode,
            conversations: mode,
            tags: mode,
            note_tags: mode,
        }
    }
}

/// Source and sink of the local dataset.
pub trait LocalDataStore: Send + Sync {
    /// Current local dataset
    fn local_snapshot(&self) -> impl Future<Output = Result<DatasetSnapshot>> + Send;

    /// Write `snapshot` into the local dataset atomically
    fn apply_snapshot(
        &self,
        snapshot: &DatasetSnapshot,
        options: &ApplyOptions,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Persistence for sync metadata and the conflict log.
pub trait SyncLedger: Send + Sync {
    fn load_metadata(&self) -> impl Future<Output = Result<SyncMetadata>> + Send;

    fn save_metadata(&self, metadata: &SyncMetadata) -> impl Future<Output = Result<()>> + Send;

    /// Append conflicts to the log; returns the number recorded
    fn record_conflicts(
        &self,
        conflicts: &[Conflict],
        strategy: MergeStrategy,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Most recent conflicts first
    fn list_conflicts(&self, limit: usize) -> impl Future<Output = Result<Vec<SyncConflict>>> + Send;
}
