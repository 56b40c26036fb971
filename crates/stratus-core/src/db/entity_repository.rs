//! Synced entity repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::collections::BTreeMap;

use libsql::Connection;

use crate::error::{Error, Result};
use crate::local::{ApplyOptions, CollectionMode};
use crate::models::{DatasetSnapshot, Note, SnapshotMetadata, SyncEntity};

pub const NOTES: &str = "notes";
pub const CONVERSATIONS: &str = "ai_conversations";
pub const TAGS: &str = "tags";
pub const NOTE_TAGS: &str = "note_tags";

const SNAPSHOT_METADATA_KEY: &str = "snapshot_metadata";

/// Trait for entity storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Load every collection plus the stored snapshot metadata
    async fn load_snapshot(&self) -> Result<DatasetSnapshot>;

    /// Write a snapshot, collection by collection, according to `options`
    async fn write_snapshot(&self, snapshot: &DatasetSnapshot, options: &ApplyOptions)
        -> Result<()>;

    /// Insert or replace a single note
    async fn upsert_note(&self, note: &Note) -> Result<()>;

    /// Get a note by ID
    async fn get_note(&self, id: &str) -> Result<Option<Note>>;

    /// List notes, most recently updated first
    async fn list_notes(&self, limit: usize) -> Result<Vec<Note>>;

    /// Remove a note; returns whether it existed
    async fn delete_note(&self, id: &str) -> Result<bool>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn load_collection<T: SyncEntity>(&self, collection: &str) -> Result<BTreeMap<String, T>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, payload FROM sync_entities WHERE collection = ? ORDER BY id",
                [collection],
            )
            .await?;

        let mut entities = BTreeMap::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let payload: String = row.get(1)?;
            let entity = serde_json::from_str::<T>(&payload).map_err(|error| {
                Error::CorruptData(format!("stored {collection} entity {id}: {error}"))
            })?;
            entities.insert(id, entity);
        }
        Ok(entities)
    }

    async fn upsert_entity<T: SyncEntity>(&self, collection: &str, id: &str, entity: &T) -> Result<()> {
        let payload = serde_json::to_string(entity)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_entities (collection, id, payload, updated_at)
                 VALUES (?, ?, ?, ?)",
                libsql::params![
                    collection,
                    id,
                    payload,
                    entity.modified_at().timestamp_millis()
                ],
            )
            .await?;
        Ok(())
    }

    async fn write_collection<T: SyncEntity>(
        &self,
        collection: &str,
        entities: &BTreeMap<String, T>,
        mode: CollectionMode,
    ) -> Result<()> {
        if mode == CollectionMode::Overwrite {
            self.conn
                .execute("DELETE FROM sync_entities WHERE collection = ?", [collection])
                .await?;
        }
        for (id, entity) in entities {
            self.upsert_entity(collection, id, entity).await?;
        }
        Ok(())
    }

    async fn load_snapshot_metadata(&self) -> Result<SnapshotMetadata> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM sync_state WHERE key = ?",
                [SNAPSHOT_METADATA_KEY],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let value: String = row.get(0)?;
                serde_json::from_str(&value).map_err(|error| {
                    Error::CorruptData(format!("stored snapshot metadata: {error}"))
                })
            }
            None => Ok(SnapshotMetadata::default()),
        }
    }

    async fn save_snapshot_metadata(&self, metadata: &SnapshotMetadata) -> Result<()> {
        // export stamps are per upload and never stored locally
        let stored = SnapshotMetadata {
            exported_at: None,
            exported_for_sync: None,
            sync: None,
            ..metadata.clone()
        };
        let value = serde_json::to_string(&stored)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [SNAPSHOT_METADATA_KEY, value.as_str()],
            )
            .await?;
        Ok(())
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn load_snapshot(&self) -> Result<DatasetSnapshot> {
        Ok(DatasetSnapshot {
            notes: self.load_collection(NOTES).await?,
            conversations: self.load_collection(CONVERSATIONS).await?,
            tags: self.load_collection(TAGS).await?,
            note_tags: self.load_collection(NOTE_TAGS).await?,
            metadata: self.load_snapshot_metadata().await?,
        })
    }

    async fn write_snapshot(
        &self,
        snapshot: &DatasetSnapshot,
        options: &ApplyOptions,
    ) -> Result<()> {
        self.write_collection(NOTES, &snapshot.notes, options.notes)
            .await?;
        self.write_collection(CONVERSATIONS, &snapshot.conversations, options.conversations)
            .await?;
        self.write_collection(TAGS, &snapshot.tags, options.tags)
            .await?;
        self.write_collection(NOTE_TAGS, &snapshot.note_tags, options.note_tags)
            .await?;
        self.save_snapshot_metadata(&snapshot.metadata).await
    }

    async fn upsert_note(&self, note: &Note) -> Result<()> {
        self.upsert_entity(NOTES, &note.id, note).await
    }

    async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload FROM sync_entities WHERE collection = ? AND id = ?",
                [NOTES, id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let payload: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&payload).map_err(|error| {
                    Error::CorruptData(format!("stored note {id}: {error}"))
                })?))
            }
            None => Ok(None),
        }
    }

    async fn list_notes(&self, limit: usize) -> Result<Vec<Note>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, payload FROM sync_entities
                 WHERE collection = ?
                 ORDER BY updated_at DESC, id
                 LIMIT ?",
                libsql::params![NOTES, limit as i64],
            )
            .await?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let payload: String = row.get(1)?;
            notes.push(serde_json::from_str(&payload).map_err(|error| {
                Error::CorruptData(format!("stored note {id}: {error}"))
            })?);
        }
        Ok(notes)
    }

    async fn delete_note(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM sync_entities WHERE collection = ? AND id = ?",
                [NOTES, id],
            )
            .await?;
        self.conn
            .execute(
                "DELETE FROM sync_entities
                 WHERE collection = ? AND json_extract(payload, '$.noteId') = ?",
                [NOTE_TAGS, id],
            )
            .await?;
        Ok(removed > 0)
    }
}
