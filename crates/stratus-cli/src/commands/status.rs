use std::path::Path;

use serde::Serialize;
use stratus_core::local::{LocalDataStore, SyncLedger};
use stratus_core::{MergeStrategy, SyncMetadata, SyncSettings};

use crate::commands::common::{format_timestamp, open_store};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub profile: String,
    pub db_path: String,
    pub remote_url: Option<String>,
    pub app_folder: String,
    pub backup_file: String,
    pub strategy: MergeStrategy,
    pub encryption_enabled: bool,
    pub passphrase_available: bool,
    pub notes: usize,
    pub entities: usize,
    pub metadata: SyncMetadata,
}

pub async fn run_status(
    profile: &str,
    as_json: bool,
    settings: &SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let snapshot = store.local_snapshot().await?;
    let metadata = store.load_metadata().await?;

    let report = StatusReport {
        profile: profile.to_string(),
        db_path: db_path.display().to_string(),
        remote_url: settings.remote.as_ref().map(|remote| remote.url.clone()),
        app_folder: settings.app_folder.clone(),
        backup_file: settings.backup_file.clone(),
        strategy: settings.strategy,
        encryption_enabled: settings.encryption.enabled,
        passphrase_available: settings.encryption.passphrase.is_some(),
        notes: snapshot.notes.len(),
        entities: snapshot.entity_count(),
        metadata,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let last_sync = report
        .metadata
        .last_sync
        .map_or_else(|| "never".to_string(), format_timestamp);
    let encryption = match (report.encryption_enabled, report.passphrase_available) {
        (false, _) => "off",
        (true, true) => "on",
        (true, false) => "on (passphrase missing)",
    };

    vec![
        format!("Profile:     {}", report.profile),
        format!("Database:    {}", report.db_path),
        format!(
            "Remote:      {}",
            report.remote_url.as_deref().unwrap_or("not configured")
        ),
        format!("Backup:      {}/{}", report.app_folder, report.backup_file),
        format!("Strategy:    {}", report.strategy.as_str()),
        format!("Encryption:  {encryption}"),
        format!("Notes:       {} ({} entities)", report.notes, report.entities),
        format!("Last sync:   {last_sync}"),
        format!(
            "Remote file: {}",
            report.metadata.remote_file_id.as_deref().unwrap_or("-")
        ),
    ]
}
