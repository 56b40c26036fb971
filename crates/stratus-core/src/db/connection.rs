//! libSQL database handle for the local store

use std::path::Path;

use libsql::{Builder, Connection, Database as LibSqlDatabase};

use super::migrations;
use crate::error::Result;

/// Pragmas applied on open. Failures are ignored; `journal_mode` returns a row
/// and does nothing for in-memory databases.
const PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA synchronous = NORMAL",
    "PRAGMA busy_timeout = 5000",
];

/// An open, migrated libSQL database with one connection.
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let location = path.as_ref().to_string_lossy().into_owned();
        let db = Builder::new_local(location).build().await?;
        Self::prepare(db).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::prepare(db).await
    }

    async fn prepare(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        for pragma in PRAGMAS {
            conn.query(pragma, ()).await.ok();
        }
        migrations::run(&conn).await?;
        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_database_is_migrated() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db
            .connection()
            .query("SELECT COUNT(*) FROM sync_entities", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_database_keeps_rows_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("stratus.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.connection()
                .execute(
                    "INSERT INTO sync_state (key, value) VALUES ('probe', 'yes')",
                    (),
                )
                .await
                .unwrap();
        }

        let db = Database::open(&path).await.unwrap();
        let mut rows = db
            .connection()
            .query("SELECT value FROM sync_state WHERE key = 'probe'", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "yes");
    }
}
