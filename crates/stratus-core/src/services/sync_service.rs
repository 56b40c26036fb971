//! Sync service: ties the local store, the coordinator and the process gate together.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::crypto::EncryptionSettings;
use crate::local::{ApplyOptions, LocalDataStore, SyncLedger};
use crate::models::{SyncConflict, SyncMetadata};
use crate::remote::{BlobStore, RemoteStore};
use crate::state::SyncState;
use crate::sync::{
    checksum, ChecksumAlgorithm, MergeStrategy, SyncCoordinator, SyncGate, SyncOptions, SyncResult,
    SyncSession, SyncTrigger,
};
use crate::{Error, Result};

/// Default bound for the sync attempted on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Passes attempted when local data changes while a sync is in flight.
const MAX_SYNC_PASSES: usize = 3;

/// Runs syncs for one local dataset against one remote.
pub struct SyncService<L, B> {
    local: L,
    coordinator: SyncCoordinator<B>,
    gate: SyncGate,
    strategy: MergeStrategy,
    state: Mutex<SyncState>,
}

impl<L, B> SyncService<L, B>
where
    L: LocalDataStore + SyncLedger,
    B: BlobStore,
{
    /// Build a service, restoring sync metadata from the local ledger.
    pub async fn open(local: L, remote: RemoteStore<B>) -> Result<Self> {
        let metadata = local.load_metadata().await?;
        tracing::debug!(
            "Loaded sync metadata (last sync: {:?}, remote file: {:?})",
            metadata.last_sync,
            metadata.remote_file_id
        );
        Ok(Self {
            local,
            coordinator: SyncCoordinator::new(remote, metadata),
            gate: SyncGate::global().clone(),
            strategy: MergeStrategy::default(),
            state: Mutex::new(SyncState::Idle),
        })
    }

    #[must_use]
    pub fn with_encryption(mut self, encryption: EncryptionSettings) -> Self {
        self.coordinator = self.coordinator.with_encryption(encryption);
        self
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: ChecksumAlgorithm) -> Self {
        self.coordinator = self.coordinator.with_checksum(checksum);
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Use a private gate instead of the process-wide one.
    #[must_use]
    pub fn with_gate(mut self, gate: SyncGate) -> Self {
        self.gate = gate;
        self
    }

    pub const fn local(&self) -> &L {
        &self.local
    }

    pub const fn coordinator(&self) -> &SyncCoordinator<B> {
        &self.coordinator
    }

    pub const fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SyncState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Sync with the service's default strategy.
    pub async fn sync_now(&self, trigger: SyncTrigger) -> Result<SyncResult> {
        self.sync_with(trigger, SyncOptions::with_strategy(self.strategy))
            .await
    }

    /// Acquire the gate and run one sync.
    ///
    /// Downloaded or merged data is applied to the local store before the
    /// metadata is persisted; metadata is saved after every attempt. When the
    /// local dataset changes while a pass is in flight, the pass is run again
    /// from the metadata it started with so those writes merge as local edits.
    pub async fn sync_with(&self, trigger: SyncTrigger, options: SyncOptions) -> Result<SyncResult> {
        let session = self.gate.acquire(trigger).await?;
        self.set_state(SyncState::Syncing);

        let outcome = self.run(&session, options).await;
        self.set_state(SyncState::after(&outcome));
        outcome
    }

    /// Like [`Self::sync_with`], abandoning the attempt after `limit`.
    pub async fn sync_with_timeout(
        &self,
        trigger: SyncTrigger,
        options: SyncOptions,
        limit: Duration,
    ) -> Result<SyncResult> {
        if let Ok(outcome) = tokio::time::timeout(limit, self.sync_with(trigger, options)).await {
            outcome
        } else {
            tracing::warn!("Sync ({trigger}) abandoned after {}s", limit.as_secs());
            let outcome = Err(Error::Cancelled(format!(
                "sync did not finish within {}s",
                limit.as_secs()
            )));
            self.set_state(SyncState::after(&outcome));
            outcome
        }
    }

    /// Final sync before the process exits; waits for a running sync first.
    pub async fn sync_before_shutdown(&self, limit: Duration) -> Result<SyncResult> {
        tracing::info!("Running shutdown sync (limit {}s)", limit.as_secs());
        self.sync_with_timeout(
            SyncTrigger::Shutdown,
            SyncOptions::with_strategy(self.strategy),
            limit,
        )
        .await
    }

    pub async fn conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        self.local.list_conflicts(limit).await
    }

    async fn run(&self, session: &SyncSession, options: SyncOptions) -> Result<SyncResult> {
        let strategy = options.strategy;
        let algorithm = self.coordinator.checksum_algorithm();
        let before = self.coordinator.metadata();

        let mut pass = 1;
        let result = loop {
            let local = self.local.local_snapshot().await?;
            let seen = checksum(&local, algorithm)?;

            let result = match self.coordinator.sync(session, local, options.clone()).await {
                Ok(result) => result,
                Err(error) => {
                    self.persist_metadata().await;
                    return Err(error);
                }
            };

            let current = checksum(&self.local.local_snapshot().await?, algorithm)?;
            if current == seen {
                break result;
            }

            // Writes made during the pass are newer than the last sync only
            // relative to the metadata the pass started from.
            self.coordinator.restore_metadata(SyncMetadata {
                remote_file_id: self.coordinator.metadata().remote_file_id,
                ..before.clone()
            });
            if pass == MAX_SYNC_PASSES {
                self.persist_metadata().await;
                tracing::warn!("Local data changed during {pass} sync pass(es); giving up");
                return Err(Error::LocalChanged(pass));
            }
            tracing::info!("Local data changed during sync pass {pass}; running it again");
            pass += 1;
        };

        if let Some(merged) = &result.merged_data {
            if let Err(error) = self
                .local
                .apply_snapshot(merged, &ApplyOptions::replace_all())
                .await
            {
                // local data never landed; forget the pass
                self.coordinator.restore_metadata(before);
                tracing::error!("Failed to apply synced data locally: {error}");
                return Err(error);
            }
        }

        if !result.conflicts.is_empty() {
            self.local
                .record_conflicts(&result.conflicts, strategy)
                .await?;
        }

        self.local
            .save_metadata(&self.coordinator.metadata())
            .await?;
        Ok(result)
    }

    async fn persist_metadata(&self) {
        if let Err(error) = self
            .local
            .save_metadata(&self.coordinator.metadata())
            .await
        {
            tracing::error!("Failed to persist sync metadata: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibSqlStore;
    use crate::models::{ConflictResolution, Note};
    use crate::remote::{BlobOp, InMemoryBlobStore};
    use crate::sync::{SyncAction, SyncProgress, SyncStage};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    async fn device(blobs: &InMemoryBlobStore) -> SyncService<LibSqlStore, InMemoryBlobStore> {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        SyncService::open(store, RemoteStore::new(blobs.clone()))
            .await
            .unwrap()
            .with_gate(SyncGate::new())
    }

    fn shared_note(content: &str) -> Note {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut note = Note::new("Groceries", content);
        note.id = "note-shared".to_string();
        note.created_at = at;
        note.updated_at = at;
        note
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn two_devices_converge() {
        let blobs = InMemoryBlobStore::new();
        let laptop = device(&blobs).await;
        let phone = device(&blobs).await;

        let draft = Note::new("Trip", "pack bags");
        laptop.local().save_note(&draft).await.unwrap();
        let first = laptop.sync_now(SyncTrigger::Manual).await.unwrap();
        assert_eq!(first.action, SyncAction::Upload);

        let pulled = phone.sync_now(SyncTrigger::Manual).await.unwrap();
        assert_eq!(pulled.action, SyncAction::Download);
        assert_eq!(
            phone.local().get_note(&draft.id).await.unwrap(),
            Some(draft.clone())
        );

        let mut edited = draft.clone();
        edited.set_content("pack bags and passport");
        phone.local().save_note(&edited).await.unwrap();
        phone.local().save_note(&Note::new("Phone only", "x")).await.unwrap();
        let pushed = phone.sync_now(SyncTrigger::Manual).await.unwrap();
        assert_eq!(pushed.action, SyncAction::Merge);

        let converged = laptop.sync_now(SyncTrigger::Manual).await.unwrap();
        assert_eq!(converged.action, SyncAction::Merge);
        assert_eq!(
            laptop.local().get_note(&draft.id).await.unwrap(),
            Some(edited)
        );

        let laptop_data = laptop.local().local_snapshot().await.unwrap();
        let phone_data = phone.local().local_snapshot().await.unwrap();
        assert_eq!(laptop_data.notes, phone_data.notes);
        assert_eq!(laptop_data.notes.len(), 2);

        assert_eq!(
            laptop.sync_now(SyncTrigger::Manual).await.unwrap().action,
            SyncAction::None
        );
        assert_eq!(
            phone.sync_now(SyncTrigger::Manual).await.unwrap().action,
            SyncAction::None
        );
        assert_eq!(laptop.state(), SyncState::Synced);
    }

    /// Options whose progress callback saves a fresh note through `store`
    /// each time the merge stage starts, up to `limit` times.
    fn writes_during_merge(store: LibSqlStore, limit: usize) -> (SyncOptions, Arc<AtomicUsize>) {
        let written = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&written);
        let options = SyncOptions {
            on_progress: Some(Arc::new(move |progress: &SyncProgress| {
                if progress.stage != SyncStage::ResolvingConflicts
                    || counter.load(Ordering::SeqCst) >= limit
                {
                    return;
                }
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let note = Note::new(format!("Typed {index}"), "while syncing");
                tokio::task::block_in_place(|| {
                    Handle::current().block_on(store.save_note(&note)).unwrap();
                });
            })),
            ..SyncOptions::default()
        };
        (options, written)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn note_saved_during_merge_is_kept_and_uploaded() {
        let blobs = InMemoryBlobStore::new();
        let laptop = device(&blobs).await;
        laptop.local().save_note(&Note::new("Laptop", "one")).await.unwrap();
        laptop.sync_now(SyncTrigger::Manual).await.unwrap();

        let phone = device(&blobs).await;
        phone.local().save_note(&Note::new("Phone", "two")).await.unwrap();
        let (options, written) = writes_during_merge(phone.local().clone(), 1);

        let result = phone.sync_with(SyncTrigger::Manual, options).await.unwrap();
        assert_eq!(result.action, SyncAction::Merge);
        assert_eq!(written.load(Ordering::SeqCst), 1);

        let titles = |snapshot: crate::DatasetSnapshot| {
            let mut titles = snapshot
                .notes
                .into_values()
                .map(|note| note.title)
                .collect::<Vec<_>>();
            titles.sort();
            titles
        };
        let expected = vec![
            "Laptop".to_string(),
            "Phone".to_string(),
            "Typed 0".to_string(),
        ];
        assert_eq!(titles(phone.local().local_snapshot().await.unwrap()), expected);

        laptop.sync_now(SyncTrigger::Manual).await.unwrap();
        assert_eq!(titles(laptop.local().local_snapshot().await.unwrap()), expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn constant_local_writes_stop_after_bounded_passes() {
        let blobs = InMemoryBlobStore::new();
        let laptop = device(&blobs).await;
        laptop.local().save_note(&Note::new("Laptop", "one")).await.unwrap();
        laptop.sync_now(SyncTrigger::Manual).await.unwrap();

        let phone = device(&blobs).await;
        phone.local().save_note(&Note::new("Phone", "two")).await.unwrap();
        let (options, written) = writes_during_merge(phone.local().clone(), usize::MAX);

        let error = phone
            .sync_with(SyncTrigger::Manual, options)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::LocalChanged(MAX_SYNC_PASSES)));
        assert_eq!(written.load(Ordering::SeqCst), MAX_SYNC_PASSES);
        assert_eq!(
            phone.local().local_snapshot().await.unwrap().notes.len(),
            1 + MAX_SYNC_PASSES
        );
        assert_eq!(phone.local().load_metadata().await.unwrap().last_sync, None);

        let settled = phone.sync_now(SyncTrigger::Manual).await.unwrap();
        assert_eq!(settled.action, SyncAction::Merge);
        assert_eq!(
            phone.local().local_snapshot().await.unwrap().notes.len(),
            2 + MAX_SYNC_PASSES
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn metadata_survives_restart() {
        let blobs = InMemoryBlobStore::new();
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store.save_note(&Note::new("Hi", "there")).await.unwrap();

        let service = SyncService::open(store.clone(), RemoteStore::new(blobs.clone()))
            .await
            .unwrap()
            .with_gate(SyncGate::new());
        service.sync_now(SyncTrigger::Manual).await.unwrap();
        let persisted = store.load_metadata().await.unwrap();
        assert_eq!(persisted, service.coordinator().metadata());
        assert!(persisted.last_sync.is_some());

        let restarted = SyncService::open(store, RemoteStore::new(blobs))
            .await
            .unwrap()
            .with_gate(SyncGate::new());
        assert_eq!(restarted.coordinator().metadata(), persisted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_conflicts_are_logged_and_nothing_uploaded() {
        let blobs = InMemoryBlobStore::new();
        let laptop = device(&blobs).await;
        laptop
            .local()
            .save_note(&shared_note("milk"))
            .await
            .unwrap();
        laptop.sync_now(SyncTrigger::Manual).await.unwrap();

        let phone = device(&blobs).await.with_strategy(MergeStrategy::Manual);
        phone
            .local()
            .save_note(&shared_note("oat milk"))
            .await
            .unwrap();
        blobs.reset_calls();

        let result = phone.sync_now(SyncTrigger::Manual).await.unwrap();
        assert_eq!(result.action, SyncAction::Conflict);
        assert_eq!(blobs.calls(BlobOp::UpdateFile), 0);
        assert_eq!(phone.state(), SyncState::Conflicted);
        assert_eq!(
            phone.local().get_note("note-shared").await.unwrap().unwrap().content,
            "oat milk"
        );

        let logged = phone.conflicts(10).await.unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].entity_id, "note-shared");
        assert_eq!(logged[0].resolution, ConflictResolution::Unresolved);
        assert_eq!(logged[0].strategy, "manual");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn busy_gate_rejects_manual_sync() {
        let blobs = InMemoryBlobStore::new();
        let gate = SyncGate::new();
        let service = device(&blobs).await.with_gate(gate.clone());

        let held = gate.acquire(SyncTrigger::Manual).await.unwrap();
        let error = service.sync_now(SyncTrigger::Manual).await.unwrap_err();
        assert!(matches!(error, Error::SyncInProgress));
        assert_eq!(blobs.calls(BlobOp::ListFolders), 0);

        drop(held);
        assert!(service.sync_now(SyncTrigger::Periodic).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_sync_still_persists_cleared_file_id() {
        let blobs = InMemoryBlobStore::new();
        let service = device(&blobs).await;
        service
            .local()
            .save_note(&Note::new("A", "b"))
            .await
            .unwrap();
        service.sync_now(SyncTrigger::Manual).await.unwrap();
        assert!(service.local().load_metadata().await.unwrap().remote_file_id.is_some());

        blobs.fail_next(BlobOp::GetFileContent, 404, 1);
        let error = service.sync_now(SyncTrigger::Manual).await.unwrap_err();
        assert!(matches!(error, Error::RemoteNotFound(_)));
        assert_eq!(service.state(), SyncState::Error);
        assert_eq!(
            service.local().load_metadata().await.unwrap().remote_file_id,
            None
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn network_failure_leaves_local_data_alone() {
        let blobs = InMemoryBlobStore::new();
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let service = SyncService::open(
            store,
            RemoteStore::new(blobs.clone()).with_retry_policy(crate::remote::RetryPolicy::none()),
        )
        .await
        .unwrap()
        .with_gate(SyncGate::new());
        let note = Note::new("Offline", "draft");
        service.local().save_note(&note).await.unwrap();

        blobs.fail_next(BlobOp::ListFolders, 503, 1);
        let error = service.sync_now(SyncTrigger::Manual).await.unwrap_err();
        assert!(matches!(error, Error::Network(_)));
        assert_eq!(service.state(), SyncState::Offline);
        assert_eq!(service.local().get_note(&note.id).await.unwrap(), Some(note));
    }

    #[tokio::test]
    async fn slow_remote_is_abandoned_at_timeout() {
        let blobs = InMemoryBlobStore::new();
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let service = SyncService::open(store, RemoteStore::new(blobs.clone()))
            .await
            .unwrap()
            .with_gate(SyncGate::new());
        tokio::time::pause();

        // four 503s keep the store in backoff for 1s + 2s + 4s
        blobs.fail_next(BlobOp::ListFolders, 503, 4);
        let error = service
            .sync_before_shutdown(Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Cancelled(_)));
        assert_eq!(service.state(), SyncState::Offline);
        assert!(!service.coordinator().is_syncing());
    }
}
