//! Shared libSQL-backed local store used by the sync service and the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{
    Database, EntityRepository, LibSqlEntityRepository, LibSqlSyncStateRepository,
    SyncStateRepository,
};
use crate::local::{ApplyOptions, LocalDataStore, SyncLedger};
use crate::models::{Conflict, DatasetSnapshot, Note, SyncConflict, SyncMetadata};
use crate::sync::MergeStrategy;
use crate::Result;

/// Thread-safe handle over one local database.
#[derive(Clone)]
pub struct LibSqlStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl std::fmt::Debug for LibSqlStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LibSqlStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl LibSqlStore {
    /// Open the store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub async fn save_note(&self, note: &Note) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .upsert_note(note)
            .await
    }

    pub async fn get_note(&self, id: &str) -> Result<Option<Note>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .get_note(id)
            .await
    }

    pub async fn list_notes(&self, limit: usize) -> Result<Vec<Note>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .list_notes(limit)
            .await
    }

    pub async fn delete_note(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .delete_note(id)
            .await
    }
}

impl LocalDataStore for LibSqlStore {
    async fn local_snapshot(&self) -> Result<DatasetSnapshot> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection())
            .load_snapshot()
            .await
    }

    async fn apply_snapshot(&self, snapshot: &DatasetSnapshot, options: &ApplyOptions) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN TRANSACTION", ()).await?;
        let written = LibSqlEntityRepository::new(conn)
            .write_snapshot(snapshot, options)
            .await;

        if let Err(error) = written {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error);
        }
        if let Err(error) = conn.execute("COMMIT", ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        tracing::debug!(
            "Applied snapshot with {} entities to local store",
            snapshot.entity_count()
        );
        Ok(())
    }
}

impl SyncLedger for LibSqlStore {
    async fn load_metadata(&self) -> Result<SyncMetadata> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .load_metadata()
            .await
    }

    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .save_metadata(metadata)
            .await
    }

    async fn record_conflicts(&self, conflicts: &[Conflict], strategy: MergeStrategy) -> Result<usize> {
        if conflicts.is_empty() {
            return Ok(0);
        }
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .record_conflicts(conflicts, strategy)
            .await
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        LibSqlSyncStateRepository::new(db.connection())
            .list_conflicts(limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tag;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snapshot_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("stratus.db");

        let mut snapshot = DatasetSnapshot::new();
        snapshot.insert_note(Note::new("Keep", "me"));
        snapshot.insert_tag(Tag::new("kept"));
        {
            let store = LibSqlStore::open_path(&path).await.unwrap();
            store
                .apply_snapshot(&snapshot, &ApplyOptions::replace_all())
                .await
                .unwrap();
            store
                .save_metadata(&SyncMetadata {
                    remote_file_id: Some("file-9".to_string()),
                    ..SyncMetadata::default()
                })
                .await
                .unwrap();
        }

        let store = LibSqlStore::open_path(&path).await.unwrap();
        assert_eq!(store.db_path(), Some(path.as_path()));
        assert_eq!(store.local_snapshot().await.unwrap(), snapshot);
        assert_eq!(
            store.load_metadata().await.unwrap().remote_file_id.as_deref(),
            Some("file-9")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_notes_round_trip_through_store() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let note = Note::new("Title", "body");
        store.save_note(&note).await.unwrap();

        assert_eq!(store.get_note(&note.id).await.unwrap(), Some(note.clone()));
        assert_eq!(store.list_notes(5).await.unwrap(), vec![note.clone()]);
        assert!(store.delete_note(&note.id).await.unwrap());
        assert!(store.local_snapshot().await.unwrap().notes.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_conflict_batch_is_noop() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        assert_eq!(
            store
                .record_conflicts(&[], MergeStrategy::Merge)
                .await
                .unwrap(),
            0
        );
        assert!(store.list_conflicts(10).await.unwrap().is_empty());
    }
}
