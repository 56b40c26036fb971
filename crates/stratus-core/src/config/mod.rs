//! Sync configuration loaded from the environment.
//!
//! Every value has a default except the remote endpoint, which is optional:
//! without it the engine runs local-only. `STRATUS_REMOTE_URL` and
//! `STRATUS_REMOTE_TOKEN` must be set together.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::crypto::{EncryptionSettings, DEFAULT_KDF_ITERATIONS};
use crate::remote::{HttpBlobStore, RemoteStore, DEFAULT_APP_FOLDER, DEFAULT_BACKUP_FILE};
use crate::services::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::sync::{ChecksumAlgorithm, MergeStrategy};
use crate::util::{normalize_base_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_REMOTE_URL: &str = "STRATUS_REMOTE_URL";
pub const ENV_REMOTE_TOKEN: &str = "STRATUS_REMOTE_TOKEN";
pub const ENV_APP_FOLDER: &str = "STRATUS_APP_FOLDER";
pub const ENV_BACKUP_FILE: &str = "STRATUS_BACKUP_FILE";
pub const ENV_SYNC_STRATEGY: &str = "STRATUS_SYNC_STRATEGY";
pub const ENV_ENCRYPTION: &str = "STRATUS_ENCRYPTION";
pub const ENV_ENCRYPTION_PASSPHRASE: &str = "STRATUS_ENCRYPTION_PASSPHRASE";
pub const ENV_KDF_ITERATIONS: &str = "STRATUS_KDF_ITERATIONS";
pub const ENV_CHECKSUM: &str = "STRATUS_CHECKSUM";
pub const ENV_SYNC_INTERVAL_SECS: &str = "STRATUS_SYNC_INTERVAL_SECS";
pub const ENV_SHUTDOWN_TIMEOUT_SECS: &str = "STRATUS_SHUTDOWN_TIMEOUT_SECS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "STRATUS_HTTP_TIMEOUT_SECS";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const MIN_KDF_ITERATIONS: u32 = 1_000;

/// Remote blob endpoint and its bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: String,
    pub token: String,
}

impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteSettings")
            .field("url", &self.url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Everything needed to build a sync service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub remote: Option<RemoteSettings>,
    pub app_folder: String,
    pub backup_file: String,
    pub strategy: MergeStrategy,
    pub encryption: EncryptionSettings,
    pub checksum: ChecksumAlgorithm,
    /// `None` disables periodic sync
    pub sync_interval: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub http_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote: None,
            app_folder: DEFAULT_APP_FOLDER.to_string(),
            backup_file: DEFAULT_BACKUP_FILE.to_string(),
            strategy: MergeStrategy::default(),
            encryption: EncryptionSettings::default(),
            checksum: ChecksumAlgorithm::default(),
            sync_interval: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl SyncSettings {
    /// Load settings from `STRATUS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        parse_settings(|key| env::var(key).ok())
    }

    /// HTTP blob store for the configured remote, if any.
    pub fn http_blob_store(&self) -> Result<Option<HttpBlobStore>> {
        self.remote
            .as_ref()
            .map(|remote| HttpBlobStore::with_timeout(&remote.url, &remote.token, self.http_timeout))
            .transpose()
    }

    /// Wrap `blobs` with the configured folder and file names.
    pub fn remote_store<B>(&self, blobs: B) -> RemoteStore<B>
    where
        B: crate::remote::BlobStore,
    {
        RemoteStore::new(blobs).with_names(&self.app_folder, &self.backup_file)
    }
}

/// Parse settings from an arbitrary key lookup.
pub fn parse_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<SyncSettings> {
    let value = |key: &str| normalize_text_option(lookup(key));
    let defaults = SyncSettings::default();

    let remote = match (value(ENV_REMOTE_URL), value(ENV_REMOTE_TOKEN)) {
        (None, None) => None,
        (Some(url), Some(token)) => {
            let url = normalize_base_url(&url).ok_or_else(|| {
                Error::Config(format!("{ENV_REMOTE_URL} must include http:// or https://"))
            })?;
            Some(RemoteSettings { url, token })
        }
        (Some(_), None) => {
            return Err(Error::Config(format!(
                "remote configuration is incomplete. Missing: {ENV_REMOTE_TOKEN}"
            )))
        }
        (None, Some(_)) => {
            return Err(Error::Config(format!(
                "remote configuration is incomplete. Missing: {ENV_REMOTE_URL}"
            )))
        }
    };

    let passphrase = value(ENV_ENCRYPTION_PASSPHRASE);
    let iterations = match value(ENV_KDF_ITERATIONS) {
        Some(raw) => {
            let iterations: u32 = parse_number(ENV_KDF_ITERATIONS, &raw)?;
            if iterations < MIN_KDF_ITERATIONS {
                return Err(Error::Config(format!(
                    "{ENV_KDF_ITERATIONS} must be at least {MIN_KDF_ITERATIONS}"
                )));
            }
            iterations
        }
        None => DEFAULT_KDF_ITERATIONS,
    };
    let enabled = match value(ENV_ENCRYPTION) {
        Some(raw) => parse_flag(ENV_ENCRYPTION, &raw)?,
        None => passphrase.is_some(),
    };

    let sync_interval = match value(ENV_SYNC_INTERVAL_SECS) {
        Some(raw) => Some(parse_number::<u64>(ENV_SYNC_INTERVAL_SECS, &raw)?)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        None => None,
    };

    Ok(SyncSettings {
        remote,
        app_folder: value(ENV_APP_FOLDER).unwrap_or(defaults.app_folder),
        backup_file: value(ENV_BACKUP_FILE).unwrap_or(defaults.backup_file),
        strategy: value(ENV_SYNC_STRATEGY)
            .map(|raw| {
                raw.parse::<MergeStrategy>()
                    .map_err(|error| Error::Config(error.to_string()))
            })
            .transpose()?
            .unwrap_or_default(),
        encryption: EncryptionSettings {
            enabled,
            passphrase,
            iterations,
        },
        checksum: value(ENV_CHECKSUM)
            .map(|raw| raw.parse::<ChecksumAlgorithm>())
            .transpose()?
            .unwrap_or_default(),
        sync_interval,
        shutdown_timeout: value(ENV_SHUTDOWN_TIMEOUT_SECS)
            .map(|raw| parse_number(ENV_SHUTDOWN_TIMEOUT_SECS, &raw).map(Duration::from_secs))
            .transpose()?
            .unwrap_or(defaults.shutdown_timeout),
        http_timeout: value(ENV_HTTP_TIMEOUT_SECS)
            .map(|raw| parse_number(ENV_HTTP_TIMEOUT_SECS, &raw).map(Duration::from_secs))
            .transpose()?
            .unwrap_or(defaults.http_timeout),
    })
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} must be a whole number, got '{raw}'")))
}

/// Parse a boolean flag such as `1`, `true`, `yes`, `off`.
pub fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{key} must be true or false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<SyncSettings> {
        parse_settings(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn empty_environment_is_local_only_defaults() {
        let settings = parse_from_map(&HashMap::new()).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert!(settings.http_blob_store().unwrap().is_none());
    }

    #[test]
    fn remote_requires_url_and_token_together() {
        let mut map = HashMap::new();
        map.insert(ENV_REMOTE_URL, "https://blobs.example.com");
        let error = parse_from_map(&map).unwrap_err();
        assert!(error.to_string().contains(ENV_REMOTE_TOKEN));

        let mut map = HashMap::new();
        map.insert(ENV_REMOTE_TOKEN, "secret");
        let error = parse_from_map(&map).unwrap_err();
        assert!(error.to_string().contains(ENV_REMOTE_URL));
    }

    #[test]
    fn full_configuration_is_parsed() {
        let mut map = HashMap::new();
        map.insert(ENV_REMOTE_URL, " https://blobs.example.com/api/ ");
        map.insert(ENV_REMOTE_TOKEN, "secret");
        map.insert(ENV_APP_FOLDER, "Notes Sync");
        map.insert(ENV_SYNC_STRATEGY, "remote");
        map.insert(ENV_ENCRYPTION_PASSPHRASE, "hunter2");
        map.insert(ENV_KDF_ITERATIONS, "5000");
        map.insert(ENV_CHECKSUM, "rolling32");
        map.insert(ENV_SYNC_INTERVAL_SECS, "300");
        map.insert(ENV_SHUTDOWN_TIMEOUT_SECS, "10");

        let settings = parse_from_map(&map).unwrap();
        assert_eq!(
            settings.remote,
            Some(RemoteSettings {
                url: "https://blobs.example.com/api".to_string(),
                token: "secret".to_string(),
            })
        );
        assert_eq!(settings.app_folder, "Notes Sync");
        assert_eq!(settings.backup_file, DEFAULT_BACKUP_FILE);
        assert_eq!(settings.strategy, MergeStrategy::Remote);
        assert!(settings.encryption.enabled);
        assert_eq!(settings.encryption.iterations, 5000);
        assert_eq!(settings.checksum, ChecksumAlgorithm::Rolling32);
        assert_eq!(settings.sync_interval, Some(Duration::from_secs(300)));
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(
            settings.http_blob_store().unwrap().unwrap().base_url(),
            "https://blobs.example.com/api"
        );
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for (key, raw) in [
            (ENV_SYNC_STRATEGY, "newest"),
            (ENV_ENCRYPTION, "maybe"),
            (ENV_KDF_ITERATIONS, "10"),
            (ENV_SYNC_INTERVAL_SECS, "soon"),
            (ENV_CHECKSUM, "md5"),
        ] {
            let map = HashMap::from([(key, raw)]);
            assert!(
                matches!(parse_from_map(&map), Err(Error::Config(_))),
                "{key}={raw} should be rejected"
            );
        }
    }

    #[test]
    fn explicit_flag_overrides_passphrase_presence() {
        let map = HashMap::from([
            (ENV_ENCRYPTION, "off"),
            (ENV_ENCRYPTION_PASSPHRASE, "hunter2"),
        ]);
        let settings = parse_from_map(&map).unwrap();
        assert!(!settings.encryption.enabled);
        assert_eq!(settings.encryption.passphrase.as_deref(), Some("hunter2"));

        let map = HashMap::from([(ENV_SYNC_INTERVAL_SECS, "0")]);
        assert_eq!(parse_from_map(&map).unwrap().sync_interval, None);
    }

    #[test]
    fn remote_settings_debug_redacts_token() {
        let remote = RemoteSettings {
            url: "https://blobs.example.com".to_string(),
            token: "secret".to_string(),
        };
        let debug = format!("{remote:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    #[ignore = "Requires STRATUS_* env vars in process environment or .env"]
    fn from_env_loads_real_remote() {
        let _ = dotenvy::dotenv();
        let settings = SyncSettings::from_env().expect("env parsing should not error");
        assert!(settings.remote.is_some(), "remote should be configured");
    }
}
