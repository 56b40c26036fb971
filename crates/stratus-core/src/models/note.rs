//! Note model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{advance_timestamp, new_entity_id, EntityType, SyncEntity};

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: String,
    /// Title shown in lists and conflict reports
    #[serde(default)]
    pub title: String,
    /// Plain text content
    #[serde(default)]
    pub content: String,
    /// Ids of linked tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last update timestamp, advanced by every local mutation
    pub updated_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Pinned to the top of the list
    #[serde(default)]
    pub pinned: bool,
    /// Content is locked behind a note password
    #[serde(default)]
    pub password_protected: bool,
    /// Base64 ciphertext for password-protected notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,
    /// Fields written by other clients that this build does not know about
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Note {
    /// Create a new note with the given title and content
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_entity_id(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            updated_at: now,
            created_at: now,
            pinned: false,
            password_protected: false,
            encrypted_content: None,
            extra: BTreeMap::new(),
        }
    }

    /// Replace the content and advance `updated_at`.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.touch();
    }

    /// Advance `updated_at` past its current value.
    pub fn touch(&mut self) {
        self.updated_at = advance_timestamp(self.updated_at);
    }
}

impl SyncEntity for Note {
    const ENTITY_TYPE: EntityType = EntityType::Note;

    fn modified_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn display_title(&self) -> String {
        let title = self.title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
        self.content
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(60)
            .collect()
    }
}
