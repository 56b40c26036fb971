//! End-to-end encryption of snapshots
//!
//! Snapshots are sealed right before upload and opened right after download,
//! so the remote store only ever sees an [`EncryptedEnvelope`].

mod envelope;

pub use envelope::{
    decrypt, encrypt, is_encrypted, random_salt, EncryptedEnvelope, CIPHER_ALGORITHM,
    ENVELOPE_VERSION, KDF_ALGORITHM, SALT_BYTES,
};

use crate::models::DatasetSnapshot;
use crate::{Error, Result};

/// Default PBKDF2 iteration count for new envelopes
pub const DEFAULT_KDF_ITERATIONS: u32 = 210_000;

/// Encryption choices for one sync engine.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionSettings {
    pub enabled: bool,
    pub passphrase: Option<String>,
    pub iterations: u32,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            passphrase: None,
            iterations: DEFAULT_KDF_ITERATIONS,
        }
    }
}

impl std::fmt::Debug for EncryptionSettings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EncryptionSettings")
            .field("enabled", &self.enabled)
            .field(
                "passphrase",
                &self.passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl EncryptionSettings {
    /// Settings with encryption switched on.
    #[must_use]
    pub fn with_passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            enabled: true,
            passphrase: Some(passphrase.into()),
            ..Self::default()
        }
    }

    fn passphrase(&self) -> Result<&str> {
        self.passphrase
            .as_deref()
            .filter(|passphrase| !passphrase.is_empty())
            .ok_or(Error::EncryptionRequired)
    }
}

/// Serialize a snapshot for upload, encrypting it when enabled.
pub fn seal(snapshot: &DatasetSnapshot, settings: &EncryptionSettings) -> Result<Vec<u8>> {
    if !settings.enabled {
        return snapshot.to_json();
    }
    let passphrase = settings.passphrase()?;
    let envelope = encrypt(snapshot, passphrase, &random_salt(), settings.iterations)?;
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse a downloaded blob, decrypting it when it is an envelope.
///
/// An envelope is opened whenever a passphrase is available, even with
/// encryption disabled locally.
pub fn open(blob: &[u8], settings: &EncryptionSettings) -> Result<DatasetSnapshot> {
    if !is_encrypted(blob) {
        return DatasetSnapshot::from_json(blob);
    }
    let passphrase = settings.passphrase()?;
    let envelope: EncryptedEnvelope = serde_json::from_slice(blob)
        .map_err(|error| Error::CorruptData(format!("invalid encryption envelope: {error}")))?;
    decrypt(&envelope, passphrase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Note;

    fn settings(passphrase: &str) -> EncryptionSettings {
        EncryptionSettings {
            iterations: 1_000,
            ..EncryptionSettings::with_passphrase(passphrase)
        }
    }

    fn sample() -> DatasetSnapshot {
        let mut snapshot = DatasetSnapshot::new();
        snapshot.insert_note(Note::new("Secret", "launch codes"));
        snapshot
    }

    #[test]
    fn sealed_blob_hides_content_and_opens_again() {
        let snapshot = sample();
        let blob = seal(&snapshot, &settings("hunter2")).unwrap();

        assert!(is_encrypted(&blob));
        assert!(!String::from_utf8_lossy(&blob).contains("launch codes"));
        assert_eq!(open(&blob, &settings("hunter2")).unwrap(), snapshot);
    }

    #[test]
    fn plain_settings_produce_plain_json() {
        let snapshot = sample();
        let blob = seal(&snapshot, &EncryptionSettings::default()).unwrap();
        assert!(!is_encrypted(&blob));
        assert_eq!(open(&blob, &EncryptionSettings::default()).unwrap(), snapshot);
    }

    #[test]
    fn missing_passphrase_is_encryption_required() {
        let enabled = EncryptionSettings {
            enabled: true,
            ..EncryptionSettings::default()
        };
        assert!(matches!(
            seal(&sample(), &enabled),
            Err(Error::EncryptionRequired)
        ));

        let blob = seal(&sample(), &settings("pw")).unwrap();
        assert!(matches!(
            open(&blob, &EncryptionSettings::default()),
            Err(Error::EncryptionRequired)
        ));
    }

    #[test]
    fn encrypted_remote_opens_with_encryption_disabled() {
        let snapshot = sample();
        let blob = seal(&snapshot, &settings("pw")).unwrap();
        let disabled = EncryptionSettings {
            enabled: false,
            ..settings("pw")
        };
        assert_eq!(open(&blob, &disabled).unwrap(), snapshot);
    }

    #[test]
    fn debug_redacts_passphrase() {
        let debug = format!("{:?}", settings("correct horse"));
        assert!(!debug.contains("correct horse"));
        assert!(debug.contains("[REDACTED]"));
    }
}
