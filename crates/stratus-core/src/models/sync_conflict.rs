//! Sync conflict models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection a conflicting entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Note,
    Conversation,
    Tag,
    NoteTag,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Conversation => "conversation",
            Self::Tag => "tag",
            Self::NoteTag => "note_tag",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a detected divergence was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    KeptLocal,
    TookRemote,
    Unresolved,
}

impl ConflictResolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeptLocal => "kept_local",
            Self::TookRemote => "took_remote",
            Self::Unresolved => "unresolved",
        }
    }

    /// Parse the persisted label, treating unknown labels as unresolved.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "kept_local" => Self::KeptLocal,
            "took_remote" => Self::TookRemote,
            _ => Self::Unresolved,
        }
    }
}

/// Divergence between the local and remote copy of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub entity_type: EntityType,
    pub id: String,
    pub title: String,
    pub local_modified: DateTime<Utc>,
    pub remote_modified: DateTime<Utc>,
    pub resolution: ConflictResolution,
}

/// Conflict row recorded in the local conflict log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub title: String,
    pub local_modified: DateTime<Utc>,
    pub remote_modified: DateTime<Utc>,
    pub resolution: ConflictResolution,
    /// Strategy in effect when the conflict was seen
    pub strategy: String,
    pub recorded_at: DateTime<Utc>,
}
