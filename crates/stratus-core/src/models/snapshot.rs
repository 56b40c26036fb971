//! Dataset snapshot exchanged with the remote store

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Conversation, Note, NoteTagLink, Tag};
use crate::{Error, Result};

/// Snapshot format version written by this build.
pub const EXPORT_VERSION: &str = "2.0";

fn default_export_version() -> String {
    EXPORT_VERSION.to_string()
}

/// Snapshot-level metadata.
///
/// `exported_at`, `exported_for_sync` and `sync` change on every export and
/// never take part in checksums or equality checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    #[serde(default = "default_export_version")]
    pub export_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_for_sync: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            export_version: default_export_version(),
            exported_at: None,
            exported_for_sync: None,
            sync: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Full in-memory representation of the synced collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSnapshot {
    #[serde(default)]
    pub notes: BTreeMap<String, Note>,
    #[serde(default, rename = "ai_conversations")]
    pub conversations: BTreeMap<String, Conversation>,
    #[serde(default)]
    pub tags: BTreeMap<String, Tag>,
    #[serde(default)]
    pub note_tags: BTreeMap<String, NoteTagLink>,
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

impl DatasetSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot from its JSON wire format.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|error| Error::CorruptData(format!("invalid snapshot JSON: {error}")))
    }

    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Stamp volatile export metadata before the snapshot leaves the device.
    pub fn mark_exported_for_sync(&mut self, at: DateTime<Utc>) {
        self.metadata.exported_at = Some(at);
        self.metadata.exported_for_sync = Some(true);
    }

    /// No notes and no conversations; tags alone do not count as user content.
    #[must_use]
    pub fn lacks_primary_content(&self) -> bool {
        self.notes.is_empty() && self.conversations.is_empty()
    }

    /// Any collection holds at least one entity.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.entity_count() > 0
    }

    /// Total entities across all collections.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.notes.len() + self.conversations.len() + self.tags.len() + self.note_tags.len()
    }

    pub fn insert_note(&mut self, note: Note) {
        self.notes.insert(note.id.clone(), note);
    }

    pub fn insert_tag(&mut self, tag: Tag) {
        self.tags.insert(tag.id.clone(), tag);
    }

    pub fn insert_conversation(&mut self, conversation: Conversation) {
        self.conversations
            .insert(conversation.id.clone(), conversation);
    }

    pub fn insert_note_tag(&mut self, link: NoteTagLink) {
        self.note_tags.insert(link.id.clone(), link);
    }
}
