//! PBKDF2-HMAC-SHA256 key derivation with AES-256-GCM sealing

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::models::DatasetSnapshot;
use crate::{Error, Result};

pub const ENVELOPE_VERSION: u32 = 1;
pub const CIPHER_ALGORITHM: &str = "AES-256-GCM";
pub const KDF_ALGORITHM: &str = "PBKDF2-SHA256";
pub const SALT_BYTES: usize = 16;

const KEY_BYTES: usize = 32;
const IV_BYTES: usize = 12;

/// Encrypted snapshot as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub encrypted: bool,
    pub version: u32,
    pub algorithm: String,
    pub kdf: String,
    pub iterations: u32,
    /// Base64 salt
    pub salt: String,
    /// Base64 nonce
    pub iv: String,
    /// Base64 ciphertext with the GCM tag appended
    pub data: String,
}

#[derive(Deserialize)]
struct EnvelopeProbe {
    #[serde(default)]
    encrypted: bool,
}

/// Whether `blob` is an encryption envelope rather than a plain snapshot.
pub fn is_encrypted(blob: &[u8]) -> bool {
    serde_json::from_slice::<EnvelopeProbe>(blob).is_ok_and(|probe| probe.encrypted)
}

/// Fresh random salt for a new envelope.
pub fn random_salt() -> [u8; SALT_BYTES] {
    random_bytes()
}

/// Encrypt a snapshot under a key derived from `passphrase` and `salt`.
pub fn encrypt(
    snapshot: &DatasetSnapshot,
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<EncryptedEnvelope> {
    if iterations == 0 {
        return Err(Error::InvalidInput(
            "KDF iterations must be greater than zero".to_string(),
        ));
    }

    let plaintext = snapshot.to_json()?;
    let key = derive_key(passphrase, salt, iterations);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|error| Error::Encryption(format!("invalid encryption key: {error}")))?;
    let iv = random_bytes::<IV_BYTES>();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_slice())
        .map_err(|_| Error::Encryption("snapshot encryption failed".to_string()))?;

    Ok(EncryptedEnvelope {
        encrypted: true,
        version: ENVELOPE_VERSION,
        algorithm: CIPHER_ALGORITHM.to_string(),
        kdf: KDF_ALGORITHM.to_string(),
        iterations,
        salt: BASE64.encode(salt),
        iv: BASE64.encode(iv),
        data: BASE64.encode(ciphertext),
    })
}

/// Decrypt an envelope back into the snapshot it was made from.
pub fn decrypt(envelope: &EncryptedEnvelope, passphrase: &str) -> Result<DatasetSnapshot> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(Error::CorruptData(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    if envelope.algorithm != CIPHER_ALGORITHM || envelope.kdf != KDF_ALGORITHM {
        return Err(Error::CorruptData(format!(
            "unsupported envelope algorithm {}/{}",
            envelope.algorithm, envelope.kdf
        )));
    }

    let salt = decode_base64("salt", &envelope.salt)?;
    let iv = decode_base64("iv", &envelope.iv)?;
    let ciphertext = decode_base64("data", &envelope.data)?;
    if iv.len() != IV_BYTES {
        return Err(Error::CorruptData("invalid envelope IV length".to_string()));
    }

    let key = derive_key(passphrase, &salt, envelope.iterations);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|error| Error::Encryption(format!("invalid encryption key: {error}")))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| {
            Error::DecryptionFailed("wrong passphrase or tampered data".to_string())
        })?;

    DatasetSnapshot::from_json(&plaintext)
}

fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; KEY_BYTES] {
    let mut key = [0u8; KEY_BYTES];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
    key
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn decode_base64(field: &str, input: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(input)
        .map_err(|error| Error::CorruptData(format!("invalid base64 in envelope {field}: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Note, Tag};
    use pretty_assertions::assert_eq;

    const ITERATIONS: u32 = 1_000;

    fn sample() -> DatasetSnapshot {
        let mut snapshot = DatasetSnapshot::new();
        let mut note = Note::new("Diary", "ünïcödé and emoji 🌧");
        note.extra
            .insert("folderId".to_string(), serde_json::json!("f1"));
        snapshot.insert_note(note);
        snapshot.insert_tag(Tag::new("private"));
        snapshot
    }

    #[test]
    fn round_trip_restores_snapshot_exactly() {
        let snapshot = sample();
        let envelope = encrypt(&snapshot, "pass", &random_salt(), ITERATIONS).unwrap();
        let restored = decrypt(&envelope, "pass").unwrap();

        assert_eq!(restored, snapshot);
        assert_eq!(restored.to_json().unwrap(), snapshot.to_json().unwrap());
    }

    #[test]
    fn envelope_wire_format() {
        let envelope = encrypt(&sample(), "pass", &[7; SALT_BYTES], ITERATIONS).unwrap();
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["encrypted"], true);
        assert_eq!(value["version"], 1);
        assert_eq!(value["algorithm"], CIPHER_ALGORITHM);
        assert_eq!(value["kdf"], KDF_ALGORITHM);
        assert_eq!(value["iterations"], ITERATIONS);
        assert_eq!(BASE64.decode(&envelope.iv).unwrap().len(), IV_BYTES);
        assert!(is_encrypted(&serde_json::to_vec(&envelope).unwrap()));
    }

    #[test]
    fn wrong_passphrase_fails_authentication() {
        let envelope = encrypt(&sample(), "right", &random_salt(), ITERATIONS).unwrap();
        let error = decrypt(&envelope, "wrong").unwrap_err();
        assert!(matches!(error, Error::DecryptionFailed(_)));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let mut envelope = encrypt(&sample(), "pass", &random_salt(), ITERATIONS).unwrap();
        let mut data = BASE64.decode(&envelope.data).unwrap();
        data[0] ^= 0xff;
        envelope.data = BASE64.encode(data);

        assert!(matches!(
            decrypt(&envelope, "pass"),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let salt = random_salt();
        let first = encrypt(&sample(), "pass", &salt, ITERATIONS).unwrap();
        let second = encrypt(&sample(), "pass", &salt, ITERATIONS).unwrap();
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn unknown_version_is_corrupt_data() {
        let mut envelope = encrypt(&sample(), "pass", &random_salt(), ITERATIONS).unwrap();
        envelope.version = 9;
        assert!(matches!(
            decrypt(&envelope, "pass"),
            Err(Error::CorruptData(_))
        ));
    }

    #[test]
    fn plain_snapshot_is_not_encrypted() {
        assert!(!is_encrypted(&sample().to_json().unwrap()));
        assert!(!is_encrypted(b"not json"));
        assert!(!is_encrypted(br#"{"encrypted": false}"#));
    }
}
