//! Remote blob store access
//!
//! [`BlobStore`] is the raw transport seam; [`RemoteStore`] layers the app
//! folder, backup file lookup, and retry policy on top of it.

mod http;
mod memory;
mod retry;
mod store;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Error;

pub use http::HttpBlobStore;
pub use memory::{BlobOp, InMemoryBlobStore};
pub use retry::{RetryClass, RetryPolicy};
pub use store::{RemoteStore, DEFAULT_APP_FOLDER, DEFAULT_BACKUP_FILE};

/// MIME type of uploaded snapshots
pub const SNAPSHOT_MIME_TYPE: &str = "application/json";

/// File stored in the remote app folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub modified_time: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
}

/// Folder on the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

/// Transport-level failure, before retry classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type BlobResult<T> = std::result::Result<T, BlobError>;

impl BlobError {
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::InvalidPayload(_) => None,
        }
    }
}

impl From<BlobError> for Error {
    fn from(error: BlobError) -> Self {
        let message = error.to_string();
        match error {
            BlobError::Status { status: 404, .. } => Self::RemoteNotFound(message),
            BlobError::Status { status: 401, .. } => Self::Auth(message),
            BlobError::Status {
                status: 403 | 429, ..
            } => Self::Quota(message),
            BlobError::Status { .. } | BlobError::Transport(_) => Self::Network(message),
            BlobError::InvalidPayload(_) => Self::CorruptData(message),
        }
    }
}

/// Raw operations against a folder-and-file blob store.
pub trait BlobStore: Send + Sync {
    /// Files named `name` inside folder `parent`
    fn list_files(
        &self,
        name: &str,
        parent: &str,
    ) -> impl Future<Output = BlobResult<Vec<RemoteFile>>> + Send;

    fn create_file(
        &self,
        name: &str,
        parent: &str,
        mime_type: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = BlobResult<RemoteFile>> + Send;

    /// Replace the content of an existing file; name and parent stay as they are
    fn update_file(
        &self,
        id: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = BlobResult<RemoteFile>> + Send;

    fn get_file_content(&self, id: &str) -> impl Future<Output = BlobResult<Vec<u8>>> + Send;

    fn delete_file(&self, id: &str) -> impl Future<Output = BlobResult<()>> + Send;

    fn create_folder(&self, name: &str) -> impl Future<Output = BlobResult<RemoteFolder>> + Send;

    fn list_folders(&self, name: &str)
        -> impl Future<Output = BlobResult<Vec<RemoteFolder>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn status(code: u16) -> BlobError {
        BlobError::Status {
            status: code,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn blob_errors_map_to_most_specific_kind() {
        let cases = [
            (status(404), ErrorKind::RemoteNotFound),
            (status(401), ErrorKind::Auth),
            (status(403), ErrorKind::Quota),
            (status(429), ErrorKind::Quota),
            (status(503), ErrorKind::Network),
            (BlobError::Transport("reset".into()), ErrorKind::Network),
            (BlobError::InvalidPayload("eof".into()), ErrorKind::CorruptData),
        ];
        for (blob_error, kind) in cases {
            assert_eq!(Error::from(blob_error).kind(), kind);
        }
    }
}
