use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stratus_core::local::SyncLedger;
use stratus_core::sync::{spawn_periodic_sync, SyncOptions, SyncProgress};
use stratus_core::{MergeStrategy, SyncAction, SyncResult, SyncSettings, SyncTrigger};

use crate::commands::common::{format_conflict_lines, open_service, open_store};
use crate::error::CliError;

const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run_sync(
    strategy: Option<MergeStrategy>,
    as_json: bool,
    settings: &SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let service = open_service(store, settings).await?;

    let mut options = SyncOptions::with_strategy(strategy.unwrap_or(settings.strategy));
    if !as_json {
        options.on_progress = Some(Arc::new(|progress: &SyncProgress| {
            eprintln!("[{}] {}", progress.stage, progress.message);
        }));
    }

    let result = service.sync_with(SyncTrigger::Manual, options).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", summarize(&result));
    }

    result.into_resolved()?;
    Ok(())
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

/// Sync on an interval until Ctrl-C, then run one last sync bounded by the shutdown timeout.
pub async fn run_sync_watch(
    interval_secs: Option<u64>,
    settings: &SyncSettings,
    db_path: &Path,
) -> Result<(), CliError> {
    let interval = watch_interval(interval_secs, settings);
    let store = open_store(db_path).await?;
    let service = Arc::new(open_service(store, settings).await?);

    match service.sync_now(SyncTrigger::Manual).await {
        Ok(result) => println!("{}", summarize(&result)),
        Err(error) => tracing::warn!("Initial sync failed: {error}"),
    }

    let ticker = spawn_periodic_sync(Arc::clone(&service), interval);
    println!(
        "Syncing every {}s; press Ctrl-C to stop.",
        interval.as_secs()
    );

    tokio::signal::ctrl_c().await?;
    println!("Running final sync...");
    let outcome = service
        .sync_before_shutdown(settings.shutdown_timeout)
        .await;
    ticker.abort();

    let result = outcome?;
    println!("{}", summarize(&result));
    result.into_resolved()?;
    Ok(())
}

pub fn watch_interval(interval_secs: Option<u64>, settings: &SyncSettings) -> Duration {
    interval_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .or(settings.sync_interval)
        .unwrap_or(DEFAULT_WATCH_INTERVAL)
}

pub fn summarize(result: &SyncResult) -> String {
    let stats = &result.stats;
    match result.action {
        SyncAction::None => "Already in sync".to_string(),
        SyncAction::Upload => format!("Uploaded {} entities", stats.uploaded),
        SyncAction::Download => format!("Downloaded {} entities", stats.downloaded),
        SyncAction::Merge => format!(
            "Merged: {} uploaded, {} downloaded, {} conflict(s) resolved",
            stats.uploaded, stats.downloaded, stats.conflicts
        ),
        SyncAction::Conflict => format!(
            "{} conflict(s) need manual resolution; nothing was uploaded",
            result.conflicts.len()
        ),
    }
}
