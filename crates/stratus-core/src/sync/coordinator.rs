//! Sync coordinator: one reconcile pass between the local dataset and the remote snapshot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::checksum::{checksum, ChecksumAlgorithm};
use super::gate::SyncSession;
use super::progress::{ProgressCallback, ProgressReporter, SyncStage};
use super::resolver::{has_local_changes, resolve, MergeStrategy};
use crate::crypto::{self, EncryptionSettings};
use crate::models::{Conflict, DatasetSnapshot, SyncMetadata, EXPORT_VERSION};
use crate::remote::{BlobStore, RemoteStore};
use crate::{Error, Result};

/// Per-call sync options
#[derive(Clone, Default)]
pub struct SyncOptions {
    pub strategy: MergeStrategy,
    pub on_progress: Option<ProgressCallback>,
    /// Caller's view of the last sync; the later of this and the stored value wins
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncOptions {
    #[must_use]
    pub fn with_strategy(strategy: MergeStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for SyncOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncOptions")
            .field("strategy", &self.strategy)
            .field("on_progress", &self.on_progress.is_some())
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

/// What a sync did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Upload,
    Download,
    Merge,
    Conflict,
    None,
}

impl SyncAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Merge => "merge",
            Self::Conflict => "conflict",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub uploaded: usize,
    pub downloaded: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub action: SyncAction,
    pub conflicts: Vec<Conflict>,
    pub stats: SyncStats,
    /// Dataset the caller should apply locally after `download` or `merge`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_data: Option<DatasetSnapshot>,
}

impl SyncResult {
    const fn done(action: SyncAction) -> Self {
        Self {
            success: true,
            action,
            conflicts: Vec::new(),
            stats: SyncStats {
                uploaded: 0,
                downloaded: 0,
                conflicts: 0,
            },
            merged_data: None,
        }
    }

    /// Turn a `conflict` outcome into [`Error::ConflictUnresolved`].
    pub fn into_resolved(self) -> Result<Self> {
        if self.action == SyncAction::Conflict {
            Err(Error::ConflictUnresolved(self.conflicts.len()))
        } else {
            Ok(self)
        }
    }
}

/// Reconciles the local dataset with the single remote snapshot.
///
/// Owns the in-memory [`SyncMetadata`]; callers persist it from
/// [`SyncCoordinator::metadata`] after each attempt.
pub struct SyncCoordinator<B> {
    remote: RemoteStore<B>,
    encryption: EncryptionSettings,
    checksum: ChecksumAlgorithm,
    metadata: Mutex<SyncMetadata>,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag on every exit path.
struct InProgressGuard<'a>(&'a AtomicBool);

impl<'a> InProgressGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::SyncInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<B: BlobStore> SyncCoordinator<B> {
    pub fn new(remote: RemoteStore<B>, metadata: SyncMetadata) -> Self {
        Self {
            remote,
            encryption: EncryptionSettings::default(),
            checksum: ChecksumAlgorithm::default(),
            metadata: Mutex::new(metadata),
            in_progress: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_encryption(mut self, encryption: EncryptionSettings) -> Self {
        self.encryption = encryption;
        self
    }

    #[must_use]
    pub const fn with_checksum(mut self, checksum: ChecksumAlgorithm) -> Self {
        self.checksum = checksum;
        self
    }

    pub const fn remote(&self) -> &RemoteStore<B> {
        &self.remote
    }

    pub const fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.checksum
    }

    /// Snapshot of the current sync metadata.
    pub fn metadata(&self) -> SyncMetadata {
        self.metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Put back metadata captured before a pass whose result could not be applied.
    pub fn restore_metadata(&self, metadata: SyncMetadata) {
        self.commit_metadata(metadata);
    }

    fn commit_metadata(&self, metadata: SyncMetadata) {
        *self.metadata.lock().unwrap_or_else(PoisonError::into_inner) = metadata;
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run one sync pass for `local`.
    ///
    /// Metadata is replaced as a whole when the pass returns `Ok`. On error
    /// it stays as it was, except that `RemoteNotFound` forgets the cached
    /// remote file id.
    pub async fn sync(
        &self,
        session: &SyncSession,
        local: DatasetSnapshot,
        options: SyncOptions,
    ) -> Result<SyncResult> {
        let _guard = InProgressGuard::acquire(&self.in_progress)?;
        let reporter = ProgressReporter::new(options.on_progress.clone());
        reporter.emit(
            SyncStage::Initializing,
            format!("Starting {} sync", session.trigger()),
        );

        let mut working = self.metadata();
        match self.run(&reporter, &mut working, local, &options).await {
            Ok(result) => {
                self.commit_metadata(working);
                reporter.emit(
                    SyncStage::Completed,
                    format!("Sync finished: {}", result.action.as_str()),
                );
                tracing::info!(
                    "Sync ({}) finished with action {} (uploaded {}, downloaded {}, conflicts {})",
                    session.trigger(),
                    result.action.as_str(),
                    result.stats.uploaded,
                    result.stats.downloaded,
                    result.stats.conflicts
                );
                Ok(result)
            }
            Err(error) => {
                if matches!(error, Error::RemoteNotFound(_)) {
                    let mut metadata = self.metadata();
                    metadata.remote_file_id = None;
                    self.commit_metadata(metadata);
                    tracing::warn!("Remote backup disappeared; cleared cached file id");
                }
                reporter.emit(SyncStage::Error, error.to_string());
                tracing::error!("Sync ({}) failed: {error}", session.trigger());
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        reporter: &ProgressReporter,
        metadata: &mut SyncMetadata,
        local: DatasetSnapshot,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        reporter.emit(SyncStage::CheckingRemote, "Looking for remote backup");
        self.remote.ensure_app_folder().await?;
        let remote_file = self.remote.find_backup_file().await?;
        metadata.remote_file_id = remote_file.as_ref().map(|file| file.id.clone());
        let remote = match &remote_file {
            Some(file) => {
                let blob = self.remote.download(&file.id).await?;
                Some(crypto::open(&blob, &self.encryption)?)
            }
            None => None,
        };

        reporter.emit(SyncStage::AnalyzingLocal, "Computing local checksum");
        let local_checksum = checksum(&local, self.checksum)?;

        let (Some(remote_file), Some(remote)) = (remote_file, remote) else {
            reporter.emit(SyncStage::Uploading, "No remote backup; uploading local data");
            let file = self.upload(&local, None).await?;
            metadata.remote_file_id = Some(file.id);
            metadata.remote_checksum = Some(local_checksum.clone());
            metadata.local_checksum = Some(local_checksum);
            mark_synced(metadata);

            let mut result = SyncResult::done(SyncAction::Upload);
            result.stats.uploaded = local.entity_count();
            return Ok(result);
        };

        let remote_checksum = checksum(&remote, self.checksum)?;
        metadata.remote_checksum = Some(remote_checksum.clone());

        if local_checksum == remote_checksum {
            tracing::debug!("Local and remote content match ({local_checksum})");
            metadata.local_checksum = Some(local_checksum);
            mark_synced(metadata);
            return Ok(SyncResult::done(SyncAction::None));
        }

        if !has_local_changes(&local, &remote) {
            reporter.emit(SyncStage::Downloading, "Taking remote backup as local data");
            metadata.local_checksum = Some(remote_checksum);
            mark_synced(metadata);

            let mut result = SyncResult::done(SyncAction::Download);
            result.stats.downloaded = remote.entity_count();
            result.merged_data = Some(remote);
            return Ok(result);
        }

        reporter.emit(SyncStage::ResolvingConflicts, "Merging local and remote changes");
        let last_sync = metadata.effective_last_sync(options.last_sync);
        let resolution = resolve(&local, &remote, options.strategy, last_sync);
        let stats = SyncStats {
            uploaded: 0,
            downloaded: resolution.taken_from_remote,
            conflicts: resolution.conflicts.len(),
        };

        if !resolution.resolved {
            tracing::warn!(
                "{} conflict(s) left for manual resolution; nothing uploaded",
                resolution.conflicts.len()
            );
            metadata.local_checksum = Some(local_checksum);
            return Ok(SyncResult {
                success: false,
                action: SyncAction::Conflict,
                conflicts: resolution.conflicts,
                stats,
                merged_data: None,
            });
        }

        reporter.emit(SyncStage::Uploading, "Uploading merged data");
        let merged_checksum = checksum(&resolution.merged, self.checksum)?;
        let file = self
            .upload(&resolution.merged, Some(&remote_file.id))
            .await?;
        metadata.remote_file_id = Some(file.id);
        metadata.local_checksum = Some(merged_checksum.clone());
        metadata.remote_checksum = Some(merged_checksum);
        mark_synced(metadata);

        Ok(SyncResult {
            success: true,
            action: SyncAction::Merge,
            conflicts: resolution.conflicts,
            stats: SyncStats {
                uploaded: resolution.merged.entity_count(),
                ..stats
            },
            merged_data: Some(resolution.merged),
        })
    }

    async fn upload(
        &self,
        snapshot: &DatasetSnapshot,
        existing: Option<&str>,
    ) -> Result<crate::remote::RemoteFile> {
        let mut outgoing = snapshot.clone();
        outgoing.mark_exported_for_sync(Utc::now());
        let body = crypto::seal(&outgoing, &self.encryption)?;
        self.remote.upload(body, existing).await
    }
}

fn mark_synced(metadata: &mut SyncMetadata) {
    metadata.last_sync = Some(Utc::now());
    EXPORT_VERSION.clone_into(&mut metadata.last_sync_version);
}
