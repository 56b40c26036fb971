//! Error types for stratus-core

use serde::Serialize;
use thiserror::Error;

/// Result type alias using stratus-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stratus-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure that outlived the retry budget
    #[error("Network error: {0}")]
    Network(String),

    /// Remote rejected our credentials; re-authentication is required upstream
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Remote quota or rate limit exhausted
    #[error("Quota error: {0}")]
    Quota(String),

    /// Remote backup file is gone
    #[error("Remote file not found: {0}")]
    RemoteNotFound(String),

    /// Encryption is enabled, or the remote blob is encrypted, but no passphrase is available
    #[error("Encryption passphrase required")]
    EncryptionRequired,

    /// Remote envelope could not be opened with the configured passphrase
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Sealing a snapshot failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Malformed snapshot JSON, remote or on disk
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// Manual strategy left conflicts for the caller to resolve
    #[error("{0} sync conflict(s) need manual resolution")]
    ConflictUnresolved(usize),

    /// Another sync holds the gate
    #[error("A sync is already in progress")]
    SyncInProgress,

    /// The sync was abandoned before it finished
    #[error("Sync cancelled: {0}")]
    Cancelled(String),

    /// Local data kept changing while sync passes ran
    #[error("Local data changed during sync {0} time(s); try again")]
    LocalChanged(usize),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification for UI guidance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Network,
    Auth,
    Quota,
    RemoteNotFound,
    EncryptionRequired,
    DecryptionFailed,
    CorruptData,
    ConflictUnresolved,
    SyncInProgress,
    Cancelled,
    Local,
}

impl Error {
    /// Most specific kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Quota(_) => ErrorKind::Quota,
            Self::RemoteNotFound(_) => ErrorKind::RemoteNotFound,
            Self::EncryptionRequired => ErrorKind::EncryptionRequired,
            Self::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Self::CorruptData(_) => ErrorKind::CorruptData,
            Self::ConflictUnresolved(_) => ErrorKind::ConflictUnresolved,
            Self::SyncInProgress => ErrorKind::SyncInProgress,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Encryption(_)
            | Self::LocalChanged(_)
            | Self::LibSql(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::InvalidInput(_)
            | Self::Config(_) => ErrorKind::Local,
        }
    }

    /// Whether the caller should prompt for a passphrase instead of reporting a failure.
    #[must_use]
    pub const fn needs_passphrase(&self) -> bool {
        matches!(self, Self::EncryptionRequired | Self::DecryptionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_taxonomy() {
        assert_eq!(Error::Network("x".into()).kind(), ErrorKind::Network);
        assert_eq!(Error::Auth("x".into()).kind(), ErrorKind::Auth);
        assert_eq!(
            Error::RemoteNotFound("f".into()).kind(),
            ErrorKind::RemoteNotFound
        );
        assert_eq!(Error::ConflictUnresolved(2).kind(), ErrorKind::ConflictUnresolved);
        assert_eq!(Error::InvalidInput("x".into()).kind(), ErrorKind::Local);
        assert_eq!(Error::LocalChanged(3).kind(), ErrorKind::Local);
    }

    #[test]
    fn passphrase_errors_are_flagged() {
        assert!(Error::EncryptionRequired.needs_passphrase());
        assert!(Error::DecryptionFailed("tag mismatch".into()).needs_passphrase());
        assert!(!Error::Network("timeout".into()).needs_passphrase());
    }
}
