use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use stratus_core::db::LibSqlStore;
use stratus_core::local::LocalDataStore;
use stratus_core::models::SyncConflict;
use stratus_core::remote::HttpBlobStore;
use stratus_core::{Note, SyncService, SyncSettings};

use crate::error::CliError;

const ENV_DB_PATH: &str = "STRATUS_DB_PATH";
const SHORT_ID_LEN: usize = 13;

pub type CliSyncService = SyncService<LibSqlStore, HttpBlobStore>;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pinned: bool,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("stratus").join("stratus.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub async fn open_store(path: &Path) -> Result<LibSqlStore, CliError> {
    Ok(LibSqlStore::open_path(path).await?)
}

/// Build a sync service over the local store, or fail when no remote is configured.
pub async fn open_service(
    store: LibSqlStore,
    settings: &SyncSettings,
) -> Result<CliSyncService, CliError> {
    let blobs = settings
        .http_blob_store()?
        .ok_or(CliError::SyncNotConfigured)?;
    let service = SyncService::open(store, settings.remote_store(blobs))
        .await?
        .with_encryption(settings.encryption.clone())
        .with_checksum(settings.checksum)
        .with_strategy(settings.strategy);
    Ok(service)
}

/// Find a note by full id or a unique id prefix.
pub async fn resolve_note(query: &str, store: &LibSqlStore) -> Result<Note, CliError> {
    if let Some(note) = store.get_note(query).await? {
        return Ok(note);
    }

    let snapshot = store.local_snapshot().await?;
    let matching = snapshot
        .notes
        .range(query.to_string()..)
        .take_while(|(id, _)| id.starts_with(query))
        .take(3)
        .map(|(_, note)| note)
        .collect::<Vec<_>>();

    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(query.to_string())),
        [note] => Ok((*note).clone()),
        _ => {
            let options = matching
                .iter()
                .map(|note| short_id(&note.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    notes
        .iter()
        .map(|note| {
            let id = short_id(&note.id);
            let preview = note_preview(note, 40);
            let pin = if note.pinned { "*" } else { " " };
            format!(
                "{id:<13} {pin} {preview:<40}  {}",
                format_timestamp(note.updated_at)
            )
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    NoteListItem {
        id: note.id.clone(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        created_at: note.created_at,
        updated_at: note.updated_at,
        pinned: note.pinned,
    }
}

/// One-line preview: the title when set, else the first content line.
pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let source = if note.title.trim().is_empty() {
        note.content.lines().next().unwrap_or("")
    } else {
        note.title.as_str()
    };
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<6}  {:<12}  {} {:?}  local={} remote={}",
                format_timestamp(conflict.recorded_at),
                conflict.strategy,
                conflict.resolution.as_str(),
                conflict.entity_type,
                conflict.title,
                format_timestamp(conflict.local_modified),
                format_timestamp(conflict.remote_modified),
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}
