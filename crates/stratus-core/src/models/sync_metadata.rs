//! Persisted sync bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping that survives across syncs.
///
/// Owned by the sync coordinator; everything else only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Completion time of the last successful sync
    pub last_sync: Option<DateTime<Utc>>,
    /// Snapshot format version used by the last successful sync
    #[serde(default)]
    pub last_sync_version: String,
    /// Cached id of the remote backup file
    pub remote_file_id: Option<String>,
    pub local_checksum: Option<String>,
    pub remote_checksum: Option<String>,
}

impl SyncMetadata {
    /// Effective baseline: the later of the stored value and a caller hint.
    #[must_use]
    pub fn effective_last_sync(&self, hint: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        match (self.last_sync, hint) {
            (Some(stored), Some(hint)) => Some(stored.max(hint)),
            (stored, hint) => stored.or(hint),
        }
    }
}
