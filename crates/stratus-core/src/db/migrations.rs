//! Versioned schema migrations for the local store

use libsql::Connection;

use crate::error::Result;

type Migration = (i32, &'static [&'static str]);

/// Ordered schema steps; each runs once in its own transaction.
const MIGRATIONS: &[Migration] = &[
    (
        1,
        &[
            // One row per synced entity; payload is the entity's wire JSON
            "CREATE TABLE IF NOT EXISTS sync_entities (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_entities_updated
                ON sync_entities(collection, updated_at DESC)",
            "CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ],
    ),
    (
        2,
        &[
            "CREATE TABLE IF NOT EXISTS sync_conflicts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                title TEXT NOT NULL,
                local_modified INTEGER NOT NULL,
                remote_modified INTEGER NOT NULL,
                resolution TEXT NOT NULL,
                strategy TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_entity
                ON sync_conflicts(entity_type, entity_id)",
            "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_recorded_at
                ON sync_conflicts(recorded_at DESC)",
        ],
    ),
];

/// Bring the schema up to the newest version.
pub async fn run(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        (),
    )
    .await?;

    let current = schema_version(conn).await?;
    for (version, statements) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
        apply(conn, *version, statements).await?;
    }
    Ok(())
}

async fn schema_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;
    match rows.next().await? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(0),
    }
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let mut outcome = Ok(());
    for statement in statements {
        outcome = conn.execute(statement, ()).await.map(|_| ());
        if outcome.is_err() {
            break;
        }
    }
    if outcome.is_ok() {
        outcome = conn
            .execute(
                "INSERT INTO schema_version (version) VALUES (?)",
                libsql::params![version],
            )
            .await
            .map(|_| ());
    }
    if outcome.is_ok() {
        outcome = conn.execute("COMMIT", ()).await.map(|_| ());
    }

    if let Err(error) = outcome {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(error.into());
    }

    tracing::info!("Migrated local store to schema version {version}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn memory_connection() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_names(conn: &Connection) -> Vec<String> {
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                (),
            )
            .await
            .unwrap();
        let mut names = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            names.push(row.get::<String>(0).unwrap());
        }
        names
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_database_reaches_latest_version() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();

        let latest = MIGRATIONS.last().map_or(0, |(version, _)| *version);
        assert_eq!(schema_version(&conn).await.unwrap(), latest);
        let names = table_names(&conn).await;
        for table in ["sync_entities", "sync_state", "sync_conflicts"] {
            assert!(names.iter().any(|name| name == table), "{table}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rerunning_applies_nothing_new() {
        let conn = memory_connection().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_version", ())
            .await
            .unwrap();
        let count = rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }
}
