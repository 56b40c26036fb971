//! Content checksums for change detection
//!
//! Only user content takes part: volatile export metadata (`exportedAt`,
//! `exportedForSync`, `sync`) is stripped first so that two exports of the
//! same data hash identically.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::models::DatasetSnapshot;
use crate::{Error, Result};

/// Hash function used for snapshot checksums
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// SHA-256, rendered as `sha256:<hex>`
    #[default]
    Sha256,
    /// Legacy 32-bit rolling hash, rendered as `r32:<hex>`
    Rolling32,
}

impl ChecksumAlgorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Rolling32 => "r32",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "r32" | "rolling32" | "legacy" => Ok(Self::Rolling32),
            other => Err(Error::Config(format!("unknown checksum algorithm: {other}"))),
        }
    }
}

/// Content-only JSON view of a snapshot.
///
/// `serde_json::Map` keeps keys sorted, so the rendered string is canonical.
pub fn content_view(snapshot: &DatasetSnapshot) -> Result<Value> {
    Ok(json!({
        "notes": serde_json::to_value(&snapshot.notes)?,
        "conversations": serde_json::to_value(&snapshot.conversations)?,
        "tags": serde_json::to_value(&snapshot.tags)?,
        "noteTags": serde_json::to_value(&snapshot.note_tags)?,
        "metadata": { "exportVersion": snapshot.metadata.export_version },
    }))
}

/// Canonical content JSON used for hashing and change detection.
pub fn canonical_content_json(snapshot: &DatasetSnapshot) -> Result<String> {
    Ok(serde_json::to_string(&content_view(snapshot)?)?)
}

/// Checksum of the snapshot's content with the given algorithm.
pub fn checksum(snapshot: &DatasetSnapshot, algorithm: ChecksumAlgorithm) -> Result<String> {
    let canonical = canonical_content_json(snapshot)?;
    Ok(match algorithm {
        ChecksumAlgorithm::Sha256 => {
            let digest = Sha256::digest(canonical.as_bytes());
            let mut hex = String::with_capacity(digest.len() * 2);
            for byte in digest {
                hex.push_str(&format!("{byte:02x}"));
            }
            format!("sha256:{hex}")
        }
        ChecksumAlgorithm::Rolling32 => format!("r32:{:08x}", rolling32(&canonical)),
    })
}

/// 32-bit `h * 31 + c` hash over UTF-16 code units with wrapping arithmetic.
fn rolling32(text: &str) -> u32 {
    text.encode_utf16().fold(0_u32, |hash, unit| {
        hash.wrapping_mul(31).wrapping_add(u32::from(unit))
    })
}
