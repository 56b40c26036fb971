//! App-folder and backup-file operations with retries

use std::future::Future;

use tokio::sync::Mutex;

use super::{BlobResult, BlobStore, RemoteFile, RetryClass, RetryPolicy, SNAPSHOT_MIME_TYPE};
use crate::{Error, Result};

/// Default remote folder holding the backup file
pub const DEFAULT_APP_FOLDER: &str = "Stratus";

/// Default backup file name inside the app folder
pub const DEFAULT_BACKUP_FILE: &str = "stratus-backup.json";

/// Backup-file view over a [`BlobStore`].
pub struct RemoteStore<B> {
    blobs: B,
    app_folder: String,
    backup_file: String,
    retry: RetryPolicy,
    folder_id: Mutex<Option<String>>,
}

impl<B: BlobStore> RemoteStore<B> {
    pub fn new(blobs: B) -> Self {
        Self {
            blobs,
            app_folder: DEFAULT_APP_FOLDER.to_string(),
            backup_file: DEFAULT_BACKUP_FILE.to_string(),
            retry: RetryPolicy::default(),
            folder_id: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_names(mut self, app_folder: impl Into<String>, backup_file: impl Into<String>) -> Self {
        self.app_folder = app_folder.into();
        self.backup_file = backup_file.into();
        self
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn backup_file_name(&self) -> &str {
        &self.backup_file
    }

    /// Id of the app folder, creating it on first use.
    ///
    /// The id is cached until a call scoped to the folder reports it missing.
    pub async fn ensure_app_folder(&self) -> Result<String> {
        let mut cached = self.folder_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let existing = self
            .with_retry("list_folders", || self.blobs.list_folders(&self.app_folder))
            .await?;
        let id = if let Some(folder) = existing.into_iter().next() {
            tracing::debug!("Using existing app folder {}", folder.id);
            folder.id
        } else {
            let folder = self
                .with_retry("create_folder", || self.blobs.create_folder(&self.app_folder))
                .await?;
            tracing::info!("Created app folder '{}' ({})", self.app_folder, folder.id);
            folder.id
        };
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn forget_app_folder(&self, reason: &Error) {
        if let Some(id) = self.folder_id.lock().await.take() {
            tracing::warn!("App folder {id} is gone ({reason}); looking it up again");
        }
    }

    /// Newest backup file in the app folder, if any.
    pub async fn find_backup_file(&self) -> Result<Option<RemoteFile>> {
        let files = match self.list_backup_files().await {
            Err(error @ Error::RemoteNotFound(_)) => {
                self.forget_app_folder(&error).await;
                self.list_backup_files().await?
            }
            other => other?,
        };
        Ok(files.into_iter().max_by_key(|file| file.modified_time))
    }

    async fn list_backup_files(&self) -> Result<Vec<RemoteFile>> {
        let folder_id = self.ensure_app_folder().await?;
        self.with_retry("list_files", || {
            self.blobs.list_files(&self.backup_file, &folder_id)
        })
        .await
    }

    /// Create the backup file, or replace the content of `existing` in place.
    ///
    /// A create that finds the app folder missing re-resolves the folder once.
    pub async fn upload(&self, body: Vec<u8>, existing: Option<&str>) -> Result<RemoteFile> {
        let file = if let Some(file_id) = existing {
            self.with_retry("update_file", || {
                self.blobs.update_file(file_id, body.clone())
            })
            .await?
        } else {
            match self.create_backup_file(&body).await {
                Err(error @ Error::RemoteNotFound(_)) => {
                    self.forget_app_folder(&error).await;
                    self.create_backup_file(&body).await?
                }
                other => other?,
            }
        };
        tracing::debug!("Uploaded backup {} ({} bytes)", file.id, file.size);
        Ok(file)
    }

    async fn create_backup_file(&self, body: &[u8]) -> Result<RemoteFile> {
        let folder_id = self.ensure_app_folder().await?;
        self.with_retry("create_file", || {
            self.blobs.create_file(
                &self.backup_file,
                &folder_id,
                SNAPSHOT_MIME_TYPE,
                body.to_vec(),
            )
        })
        .await
    }

    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.with_retry("get_file_content", || self.blobs.get_file_content(file_id))
            .await
    }

    pub async fn delete(&self, file_id: &str) -> Result<()> {
        self.with_retry("delete_file", || self.blobs.delete_file(file_id))
            .await
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BlobResult<T>>,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retryable = RetryPolicy::classify(&error) == RetryClass::Retryable;
                    if !retryable || retry >= self.retry.max_retries {
                        if retryable {
                            tracing::error!(
                                "Remote {operation} failed after {} attempt(s): {error}",
                                retry + 1
                            );
                        }
                        return Err(error.into());
                    }

                    let delay = self.retry.delay_for(retry);
                    retry += 1;
                    tracing::warn!(
                        "Remote {operation} failed ({error}); retry {retry}/{} in {delay:?}",
                        self.retry.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
