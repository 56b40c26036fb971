//! Sync metadata and conflict log repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use chrono::{DateTime, Utc};
use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{Conflict, ConflictResolution, SyncConflict, SyncMetadata};
use crate::sync::MergeStrategy;

const LAST_SYNC: &str = "last_sync";
const LAST_SYNC_VERSION: &str = "last_sync_version";
const REMOTE_FILE_ID: &str = "remote_file_id";
const LOCAL_CHECKSUM: &str = "local_checksum";
const REMOTE_CHECKSUM: &str = "remote_checksum";

/// Trait for sync bookkeeping storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    /// Load sync metadata, defaulting every missing field
    async fn load_metadata(&self) -> Result<SyncMetadata>;

    /// Save sync metadata, removing keys for absent fields
    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<()>;

    /// Append conflicts to the log
    async fn record_conflicts(
        &self,
        conflicts: &[Conflict],
        strategy: MergeStrategy,
    ) -> Result<usize>;

    /// List logged conflicts, newest first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_state(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => {
                self.conn
                    .execute(
                        "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                        [key, value],
                    )
                    .await?;
            }
            None => {
                self.conn
                    .execute("DELETE FROM sync_state WHERE key = ?", [key])
                    .await?;
            }
        }
        Ok(())
    }
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn load_metadata(&self) -> Result<SyncMetadata> {
        let last_sync = match self.get_state(LAST_SYNC).await? {
            Some(value) => Some(
                DateTime::parse_from_rfc3339(&value)
                    .map_err(|error| Error::CorruptData(format!("stored last_sync: {error}")))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(SyncMetadata {
            last_sync,
            last_sync_version: self.get_state(LAST_SYNC_VERSION).await?.unwrap_or_default(),
            remote_file_id: self.get_state(REMOTE_FILE_ID).await?,
            local_checksum: self.get_state(LOCAL_CHECKSUM).await?,
            remote_checksum: self.get_state(REMOTE_CHECKSUM).await?,
        })
    }

    async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<()> {
        let last_sync = metadata.last_sync.map(|value| value.to_rfc3339());
        self.set_state(LAST_SYNC, last_sync.as_deref()).await?;
        self.set_state(
            LAST_SYNC_VERSION,
            Some(metadata.last_sync_version.as_str()).filter(|value| !value.is_empty()),
        )
        .await?;
        self.set_state(REMOTE_FILE_ID, metadata.remote_file_id.as_deref())
            .await?;
        self.set_state(LOCAL_CHECKSUM, metadata.local_checksum.as_deref())
            .await?;
        self.set_state(REMOTE_CHECKSUM, metadata.remote_checksum.as_deref())
            .await?;
        Ok(())
    }

    async fn record_conflicts(
        &self,
        conflicts: &[Conflict],
        strategy: MergeStrategy,
    ) -> Result<usize> {
        let recorded_at = Utc::now().timestamp_millis();
        for conflict in conflicts {
            self.conn
                .execute(
                    "INSERT INTO sync_conflicts (
                        entity_type, entity_id, title, local_modified, remote_modified,
                        resolution, strategy, recorded_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    libsql::params![
                        conflict.entity_type.as_str(),
                        conflict.id.as_str(),
                        conflict.title.as_str(),
                        conflict.local_modified.timestamp_millis(),
                        conflict.remote_modified.timestamp_millis(),
                        conflict.resolution.as_str(),
                        strategy.as_str(),
                        recorded_at
                    ],
                )
                .await?;
        }
        Ok(conflicts.len())
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity_type, entity_id, title, local_modified, remote_modified,
                        resolution, strategy, recorded_at
                 FROM sync_conflicts
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            let resolution: String = row.get(6)?;
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                entity_type: row.get(1)?,
                entity_id: row.get(2)?,
                title: row.get(3)?,
                local_modified: from_millis(row.get(4)?)?,
                remote_modified: from_millis(row.get(5)?)?,
                resolution: ConflictResolution::from_label(&resolution),
                strategy: row.get(7)?,
                recorded_at: from_millis(row.get(8)?)?,
            });
        }
        Ok(conflicts)
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::CorruptData(format!("timestamp out of range: {millis}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::EntityType;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_default_metadata() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        assert_eq!(repo.load_metadata().await.unwrap(), SyncMetadata::default());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_load_metadata() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        let metadata = SyncMetadata {
            last_sync: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
            last_sync_version: "2.0".to_string(),
            remote_file_id: Some("file-1".to_string()),
            local_checksum: Some("sha256:aa".to_string()),
            remote_checksum: Some("sha256:bb".to_string()),
        };

        repo.save_metadata(&metadata).await.unwrap();
        assert_eq!(repo.load_metadata().await.unwrap(), metadata);

        let cleared = SyncMetadata {
            remote_file_id: None,
            ..metadata
        };
        repo.save_metadata(&cleared).await.unwrap();
        assert_eq!(repo.load_metadata().await.unwrap().remote_file_id, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_and_list_conflicts() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        let modified = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let conflicts = vec![
            Conflict {
                entity_type: EntityType::Note,
                id: "n1".to_string(),
                title: "Plan".to_string(),
                local_modified: modified,
                remote_modified: modified,
                resolution: ConflictResolution::Unresolved,
            },
            Conflict {
                entity_type: EntityType::Tag,
                id: "t1".to_string(),
                title: "work".to_string(),
                local_modified: modified,
                remote_modified: modified,
                resolution: ConflictResolution::Unresolved,
            },
        ];

        let recorded = repo
            .record_conflicts(&conflicts, MergeStrategy::Manual)
            .await
            .unwrap();
        assert_eq!(recorded, 2);

        let listed = repo.list_conflicts(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].entity_id, "t1");
        assert_eq!(listed[0].entity_type, "tag");
        assert_eq!(listed[1].local_modified, modified);
        assert_eq!(listed[1].resolution, ConflictResolution::Unresolved);
        assert_eq!(listed[1].strategy, "manual");
        assert_eq!(repo.list_conflicts(1).await.unwrap().len(), 1);
    }
}
