//! Per-entity three-way merge between a local and a remote snapshot

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Conflict, ConflictResolution, DatasetSnapshot, SyncEntity};
use crate::{Error, Result};

/// How true conflicts (same timestamp, different content) are settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Automatic merge; ties keep the local copy
    #[default]
    Merge,
    /// Ties keep the local copy
    Local,
    /// Ties take the remote copy
    Remote,
    /// Ties are left for the caller
    Manual,
}

impl MergeStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Manual => "manual",
        }
    }

    const fn tie_resolution(self) -> ConflictResolution {
        match self {
            Self::Merge | Self::Local => ConflictResolution::KeptLocal,
            Self::Remote => ConflictResolution::TookRemote,
            Self::Manual => ConflictResolution::Unresolved,
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "manual" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!(
                "unknown merge strategy '{other}' (expected merge, local, remote or manual)"
            ))),
        }
    }
}

/// Outcome of a three-way merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub merged: DatasetSnapshot,
    pub conflicts: Vec<Conflict>,
    /// False only when `Manual` left conflicts behind
    pub resolved: bool,
    /// Entities whose remote copy made it into `merged`
    pub taken_from_remote: usize,
}

/// Merge `remote` into `local`.
///
/// Entities that exist on one side only are treated as deleted on the other
/// side when they were last modified at or before `last_sync`. Without a
/// `last_sync` every one-sided entity is kept. Merged metadata is the local
/// metadata.
#[must_use]
pub fn resolve(
    local: &DatasetSnapshot,
    remote: &DatasetSnapshot,
    strategy: MergeStrategy,
    last_sync: Option<DateTime<Utc>>,
) -> Resolution {
    let mut merger = CollectionMerger {
        strategy,
        last_sync,
        conflicts: Vec::new(),
        taken_from_remote: 0,
    };

    let merged = DatasetSnapshot {
        notes: merger.merge(&local.notes, &remote.notes),
        conversations: merger.merge(&local.conversations, &remote.conversations),
        tags: merger.merge(&local.tags, &remote.tags),
        note_tags: merger.merge(&local.note_tags, &remote.note_tags),
        metadata: local.metadata.clone(),
    };

    let resolved = merger.conflicts.is_empty() || strategy != MergeStrategy::Manual;
    if !merger.conflicts.is_empty() {
        tracing::info!(
            "Resolved {} conflict(s) with strategy {strategy} (resolved: {resolved})",
            merger.conflicts.len()
        );
    }

    Resolution {
        merged,
        conflicts: merger.conflicts,
        resolved,
        taken_from_remote: merger.taken_from_remote,
    }
}

/// Whether `local` carries content that `remote` does not have.
///
/// An empty local dataset (no notes and no conversations) facing a remote with
/// content is never a change; it is a fresh device that should download.
#[must_use]
pub fn has_local_changes(local: &DatasetSnapshot, remote: &DatasetSnapshot) -> bool {
    if local.lacks_primary_content() && remote.has_content() {
        return false;
    }
    !content_eq(local, remote)
}

/// Content equality ignoring volatile export metadata.
#[must_use]
pub fn content_eq(left: &DatasetSnapshot, right: &DatasetSnapshot) -> bool {
    left.notes == right.notes
        && left.conversations == right.conversations
        && left.tags == right.tags
        && left.note_tags == right.note_tags
        && left.metadata.export_version == right.metadata.export_version
}

struct CollectionMerger {
    strategy: MergeStrategy,
    last_sync: Option<DateTime<Utc>>,
    conflicts: Vec<Conflict>,
    taken_from_remote: usize,
}

impl CollectionMerger {
    fn deleted_elsewhere<T: SyncEntity>(&self, entity: &T) -> bool {
        self.last_sync
            .is_some_and(|last_sync| entity.modified_at() <= last_sync)
    }

    fn merge<T: SyncEntity>(
        &mut self,
        local: &BTreeMap<String, T>,
        remote: &BTreeMap<String, T>,
    ) -> BTreeMap<String, T> {
        let mut merged = BTreeMap::new();

        for (id, local_entity) in local {
            let Some(remote_entity) = remote.get(id) else {
                if self.deleted_elsewhere(local_entity) {
                    tracing::debug!("Dropping {} {id}: deleted remotely", T::ENTITY_TYPE);
                } else {
                    merged.insert(id.clone(), local_entity.clone());
                }
                continue;
            };

            let chosen = self.pick(id, local_entity, remote_entity);
            merged.insert(id.clone(), chosen.clone());
        }

        for (id, remote_entity) in remote {
            if local.contains_key(id) {
                continue;
            }
            if self.deleted_elsewhere(remote_entity) {
                tracing::debug!("Skipping {} {id}: deleted locally", T::ENTITY_TYPE);
            } else {
                self.taken_from_remote += 1;
                merged.insert(id.clone(), remote_entity.clone());
            }
        }

        merged
    }

    fn pick<'e, T: SyncEntity>(&mut self, id: &str, local: &'e T, remote: &'e T) -> &'e T {
        let local_modified = local.modified_at();
        let remote_modified = remote.modified_at();

        if remote_modified > local_modified {
            self.taken_from_remote += 1;
            return remote;
        }
        if local_modified > remote_modified || local == remote {
            return local;
        }

        let resolution = self.strategy.tie_resolution();
        self.conflicts.push(Conflict {
            entity_type: T::ENTITY_TYPE,
            id: id.to_string(),
            title: local.display_title(),
            local_modified,
            remote_modified,
            resolution,
        });

        if resolution == ConflictResolution::TookRemote {
            self.taken_from_remote += 1;
            remote
        } else {
            local
        }
    }
}
