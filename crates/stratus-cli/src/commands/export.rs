use std::path::Path;

use chrono::Utc;
use stratus_core::local::LocalDataStore;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_export(output_path: Option<&Path>, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let mut snapshot = store.local_snapshot().await?;
    snapshot.metadata.exported_at = Some(Utc::now());
    let rendered = serde_json::to_string_pretty(&snapshot)?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
