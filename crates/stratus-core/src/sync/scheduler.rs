//! Periodic background sync

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::gate::SyncTrigger;
use crate::local::{LocalDataStore, SyncLedger};
use crate::remote::BlobStore;
use crate::services::SyncService;
use crate::Error;

/// Run a `Periodic` sync every `interval` until the returned task is aborted.
///
/// The first sync happens one interval after spawning. Ticks that find the
/// gate held are skipped.
pub fn spawn_periodic_sync<L, B>(service: Arc<SyncService<L, B>>, interval: Duration) -> JoinHandle<()>
where
    L: LocalDataStore + SyncLedger + 'static,
    B: BlobStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match service.sync_now(SyncTrigger::Periodic).await {
                Ok(result) => {
                    tracing::debug!("Periodic sync finished: {}", result.action.as_str());
                }
                Err(Error::SyncInProgress) => {
                    tracing::debug!("Skipping periodic sync; another sync is running");
                }
                Err(error) => {
                    tracing::warn!("Periodic sync failed: {error}");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibSqlStore;
    use crate::models::Note;
    use crate::remote::{BlobOp, InMemoryBlobStore, RemoteStore};
    use crate::sync::SyncGate;

    #[tokio::test]
    async fn ticks_run_periodic_syncs_and_skip_when_busy() {
        let blobs = InMemoryBlobStore::new();
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store.save_note(&Note::new("Tick", "tock")).await.unwrap();
        let gate = SyncGate::new();
        let service = Arc::new(
            SyncService::open(store, RemoteStore::new(blobs.clone()))
                .await
                .unwrap()
                .with_gate(gate.clone()),
        );
        tokio::time::pause();

        let handle = spawn_periodic_sync(Arc::clone(&service), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(blobs.calls(BlobOp::CreateFile), 1);

        let held = gate.acquire(SyncTrigger::Manual).await.unwrap();
        blobs.reset_calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(blobs.calls(BlobOp::ListFiles), 0);

        drop(held);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(blobs.calls(BlobOp::ListFiles), 1);

        handle.abort();
    }
}
