//! In-process blob store with fault injection

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{BlobError, BlobResult, BlobStore, RemoteFile, RemoteFolder};

/// Operation on a [`BlobStore`], for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobOp {
    ListFiles,
    CreateFile,
    UpdateFile,
    GetFileContent,
    DeleteFile,
    CreateFolder,
    ListFolders,
}

/// Blob store kept in memory.
///
/// Clones share state, so two sync engines built on clones of one store see
/// the same remote. Modification times come from a logical clock that moves
/// one second per write.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    folders: Vec<RemoteFolder>,
    files: BTreeMap<String, StoredFile>,
    faults: Vec<Fault>,
    calls: HashMap<BlobOp, usize>,
    next_id: u64,
    ticks: i64,
}

#[derive(Debug)]
struct StoredFile {
    meta: RemoteFile,
    parent: String,
    content: Vec<u8>,
}

#[derive(Debug)]
struct Fault {
    op: BlobOp,
    error: BlobError,
    remaining: usize,
}

impl MemoryState {
    fn enter(&mut self, op: BlobOp) -> BlobResult<()> {
        *self.calls.entry(op).or_default() += 1;
        let Some(index) = self.faults.iter().position(|fault| fault.op == op) else {
            return Ok(());
        };
        let fault = &mut self.faults[index];
        let error = fault.error.clone();
        fault.remaining -= 1;
        if fault.remaining == 0 {
            self.faults.remove(index);
        }
        Err(error)
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        let epoch = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        epoch + Duration::seconds(self.ticks)
    }
}

fn not_found(id: &str) -> BlobError {
    BlobError::Status {
        status: 404,
        message: format!("file {id} not found"),
    }
}

impl InMemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `times` calls of `op` with HTTP `status`.
    pub fn fail_next(&self, op: BlobOp, status: u16, times: usize) {
        self.push_fault(
            op,
            BlobError::Status {
                status,
                message: format!("injected {status}"),
            },
            times,
        );
    }

    /// Fail the next `times` calls of `op` with a transport error.
    pub fn fail_next_transport(&self, op: BlobOp, times: usize) {
        self.push_fault(
            op,
            BlobError::Transport("injected connection reset".to_string()),
            times,
        );
    }

    fn push_fault(&self, op: BlobOp, error: BlobError, times: usize) {
        if times == 0 {
            return;
        }
        self.state().faults.push(Fault {
            op,
            error,
            remaining: times,
        });
    }

    /// Number of calls made for `op`, including failed ones.
    pub fn calls(&self, op: BlobOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    pub fn file_count(&self) -> usize {
        self.state().files.len()
    }

    /// Raw stored bytes, bypassing fault injection and call counting.
    pub fn raw_content(&self, id: &str) -> Option<Vec<u8>> {
        self.state().files.get(id).map(|file| file.content.clone())
    }

    /// Drop a file without counting a call, as another device would.
    pub fn remove_silently(&self, id: &str) -> bool {
        self.state().files.remove(id).is_some()
    }

    /// Drop every folder called `name` and the files inside, without counting calls.
    pub fn remove_folder_silently(&self, name: &str) -> usize {
        let mut state = self.state();
        let removed = state
            .folders
            .iter()
            .filter(|folder| folder.name == name)
            .map(|folder| folder.id.clone())
            .collect::<Vec<_>>();
        state.folders.retain(|folder| folder.name != name);
        state.files.retain(|_, file| !removed.contains(&file.parent));
        removed.len()
    }
}

impl BlobStore for InMemoryBlobStore {
    async fn list_files(&self, name: &str, parent: &str) -> BlobResult<Vec<RemoteFile>> {
        let mut state = self.state();
        state.enter(BlobOp::ListFiles)?;
        Ok(state
            .files
            .values()
            .filter(|file| file.meta.name == name && file.parent == parent)
            .map(|file| file.meta.clone())
            .collect())
    }

    async fn create_file(
        &self,
        name: &str,
        parent: &str,
        _mime_type: &str,
        body: Vec<u8>,
    ) -> BlobResult<RemoteFile> {
        let mut state = self.state();
        state.enter(BlobOp::CreateFile)?;
        if !state.folders.iter().any(|folder| folder.id == parent) {
            return Err(BlobError::Status {
                status: 404,
                message: format!("folder {parent} not found"),
            });
        }

        let meta = RemoteFile {
            id: state.next_id("file"),
            name: name.to_string(),
            modified_time: state.tick(),
            size: body.len() as u64,
        };
        state.files.insert(
            meta.id.clone(),
            StoredFile {
                meta: meta.clone(),
                parent: parent.to_string(),
                content: body,
            },
        );
        Ok(meta)
    }

    async fn update_file(&self, id: &str, body: Vec<u8>) -> BlobResult<RemoteFile> {
        let mut state = self.state();
        state.enter(BlobOp::UpdateFile)?;
        let modified_time = state.tick();
        let file = state.files.get_mut(id).ok_or_else(|| not_found(id))?;
        file.meta.modified_time = modified_time;
        file.meta.size = body.len() as u64;
        file.content = body;
        Ok(file.meta.clone())
    }

    async fn get_file_content(&self, id: &str) -> BlobResult<Vec<u8>> {
        let mut state = self.state();
        state.enter(BlobOp::GetFileContent)?;
        state
            .files
            .get(id)
            .map(|file| file.content.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn delete_file(&self, id: &str) -> BlobResult<()> {
        let mut state = self.state();
        state.enter(BlobOp::DeleteFile)?;
        state.files.remove(id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    async fn create_folder(&self, name: &str) -> BlobResult<RemoteFolder> {
        let mut state = self.state();
        state.enter(BlobOp::CreateFolder)?;
        let folder = RemoteFolder {
            id: state.next_id("folder"),
            name: name.to_string(),
        };
        state.folders.push(folder.clone());
        Ok(folder)
    }

    async fn list_folders(&self, name: &str) -> BlobResult<Vec<RemoteFolder>> {
        let mut state = self.state();
        state.enter(BlobOp::ListFolders)?;
        Ok(state
            .folders
            .iter()
            .filter(|folder| folder.name == name)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn faults_are_consumed_in_order() {
        let store = InMemoryBlobStore::new();
        store.fail_next(BlobOp::ListFolders, 503, 2);

        assert!(store.list_folders("x").await.is_err());
        assert!(store.list_folders("x").await.is_err());
        assert!(store.list_folders("x").await.is_ok());
        assert_eq!(store.calls(BlobOp::ListFolders), 3);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemoryBlobStore::new();
        let other = store.clone();
        let folder = store.create_folder("app").await.unwrap();
        other
            .create_file("backup.json", &folder.id, "application/json", b"{}".to_vec())
            .await
            .unwrap();

        assert_eq!(store.file_count(), 1);
        assert_eq!(
            store.list_files("backup.json", &folder.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let store = InMemoryBlobStore::new();
        let error = store.get_file_content("nope").await.unwrap_err();
        assert_eq!(error.status(), Some(404));
    }
}
