//! Sync status surfaced to front ends.

use serde::Serialize;

use crate::error::{Error, ErrorKind};
use crate::sync::{SyncAction, SyncResult};

/// Status of the most recent sync attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Synced,
    /// Manual strategy left conflicts behind
    Conflicted,
    /// Remote unreachable; local data is untouched
    Offline,
    /// Passphrase missing or wrong
    Locked,
    Error,
}

impl SyncState {
    pub fn after(outcome: &Result<SyncResult, Error>) -> Self {
        match outcome {
            Ok(result) if result.action == SyncAction::Conflict => Self::Conflicted,
            Ok(_) => Self::Synced,
            Err(error) => match error.kind() {
                ErrorKind::Network | ErrorKind::Cancelled => Self::Offline,
                ErrorKind::EncryptionRequired | ErrorKind::DecryptionFailed => Self::Locked,
                _ => Self::Error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_read_as_offline() {
        assert_eq!(
            SyncState::after(&Err(Error::Network("reset".into()))),
            SyncState::Offline
        );
        assert_eq!(
            SyncState::after(&Err(Error::EncryptionRequired)),
            SyncState::Locked
        );
        assert_eq!(
            SyncState::after(&Err(Error::Auth("expired".into()))),
            SyncState::Error
        );
    }
}
