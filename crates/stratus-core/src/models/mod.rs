//! Data models for Stratus

mod conversation;
mod note;
mod snapshot;
mod sync_conflict;
mod sync_metadata;
mod tag;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

pub use conversation::Conversation;
pub use note::Note;
pub use snapshot::{DatasetSnapshot, SnapshotMetadata, EXPORT_VERSION};
pub use sync_conflict::{Conflict, ConflictResolution, EntityType, SyncConflict};
pub use sync_metadata::SyncMetadata;
pub use tag::{NoteTagLink, Tag};

/// A record that takes part in the per-entity three-way merge.
pub trait SyncEntity: Clone + PartialEq + Serialize + DeserializeOwned {
    /// Collection this entity belongs to
    const ENTITY_TYPE: EntityType;

    /// Ordering signal for conflict resolution
    fn modified_at(&self) -> DateTime<Utc>;

    /// Human-readable label used in conflict reports
    fn display_title(&self) -> String;
}

/// Generate a new time-sortable entity id (UUID v7).
#[must_use]
pub fn new_entity_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current timestamp, advanced past `previous` so local edits always move forward.
#[must_use]
pub fn advance_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::milliseconds(1)
    }
}
