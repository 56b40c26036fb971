use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stratus_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Passphrase cannot be empty")]
    EmptyPassphrase,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Keychain error: {0}")]
    Keychain(String),
    #[error(
        "Sync is not configured. Run `stratus config init --remote-url <URL> --remote-token <TOKEN>`, or set STRATUS_REMOTE_URL and STRATUS_REMOTE_TOKEN."
    )]
    SyncNotConfigured,
}

impl CliError {
    /// Follow-up hint printed under the error, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Core(error) if error.needs_passphrase() => {
                Some("Run `stratus passphrase set` with the passphrase used on your other devices.")
            }
            Self::Core(stratus_core::Error::ConflictUnresolved(_)) => Some(
                "Inspect them with `stratus sync conflicts`, then rerun with `--strategy local` or `--strategy remote`.",
            ),
            _ => None,
        }
    }
}
