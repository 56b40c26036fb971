//! Tag and note-tag link models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{new_entity_id, EntityType, SyncEntity};

/// A tag for organizing notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Unique identifier
    pub id: String,
    /// Tag name (stored in lowercase)
    pub name: String,
    /// Optional display color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last rename or recolor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Tag {
    /// Create a new tag with the given name
    ///
    /// The name is automatically converted to lowercase.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into().to_lowercase(),
            color: None,
            created_at: Utc::now(),
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }
}

impl SyncEntity for Tag {
    const ENTITY_TYPE: EntityType = EntityType::Tag;

    fn modified_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    fn display_title(&self) -> String {
        self.name.clone()
    }
}

/// Link between a note and a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTagLink {
    /// Link identifier, `<note id>:<tag id>` for links created here
    pub id: String,
    pub note_id: String,
    pub tag_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl NoteTagLink {
    #[must_use]
    pub fn new(note_id: impl Into<String>, tag_id: impl Into<String>) -> Self {
        let note_id = note_id.into();
        let tag_id = tag_id.into();
        Self {
            id: format!("{note_id}:{tag_id}"),
            note_id,
            tag_id,
            created_at: Utc::now(),
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }
}

impl SyncEntity for NoteTagLink {
    const ENTITY_TYPE: EntityType = EntityType::NoteTag;

    fn modified_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    fn display_title(&self) -> String {
        format!("{} -> {}", self.note_id, self.tag_id)
    }
}
