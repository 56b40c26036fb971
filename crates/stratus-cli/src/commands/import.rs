use std::path::Path;

use stratus_core::crypto;
use stratus_core::local::{ApplyOptions, LocalDataStore};
use stratus_core::SyncSettings;

use crate::commands::common::open_store;
use crate::error::CliError;

/// Load a plain or encrypted snapshot file into the local store.
pub async fn run_import(
    path: &Path,
    replace: bool,
    settings: &SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    let blob = std::fs::read(path)?;
    let snapshot = crypto::open(&blob, &settings.encryption)?;

    let options = if replace {
        ApplyOptions::replace_all()
    } else {
        ApplyOptions::union_all()
    };
    let store = open_store(db_path).await?;
    store.apply_snapshot(&snapshot, &options).await?;

    tracing::info!(
        "Imported {} entities from {}",
        snapshot.entity_count(),
        path.display()
    );
    println!(
        "Imported {} notes ({} entities)",
        snapshot.notes.len(),
        snapshot.entity_count()
    );
    Ok(())
}
