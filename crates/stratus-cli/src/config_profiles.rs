//! Persistent CLI profile configuration.
//!
//! Profiles hold non-secret sync settings. The remote token and the
//! encryption passphrase live in the OS keychain, and `STRATUS_*`
//! environment variables override both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stratus_core::config::{
    parse_settings, ENV_APP_FOLDER, ENV_BACKUP_FILE, ENV_ENCRYPTION, ENV_ENCRYPTION_PASSPHRASE,
    ENV_REMOTE_TOKEN, ENV_REMOTE_URL, ENV_SYNC_INTERVAL_SECS, ENV_SYNC_STRATEGY,
};
use stratus_core::util::normalize_text_option;
use stratus_core::SyncSettings;

use crate::error::CliError;
use crate::secrets::{SecretKind, SecretStore};

const CONFIG_FILE_NAME: &str = "cli-config.json";
const ENV_PROFILE: &str = "STRATUS_PROFILE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub app_folder: Option<String>,
    #[serde(default)]
    pub backup_file: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub encryption: Option<bool>,
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join("stratus").join(CONFIG_FILE_NAME))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI config directory".to_string()))
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    normalize_text_option(value.map(str::to_string))
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, CliError> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!("Failed to read config at {}: {error}", path.display()))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!("Failed to parse config at {}: {error}", path.display()))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, CliError> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(std::env::var(ENV_PROFILE).ok().as_deref()) {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        "default".to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Value this profile supplies for a `STRATUS_*` setting.
    pub fn setting(&self, key: &str) -> Option<String> {
        match key {
            ENV_REMOTE_URL => self.remote_url.clone(),
            ENV_APP_FOLDER => self.app_folder.clone(),
            ENV_BACKUP_FILE => self.backup_file.clone(),
            ENV_SYNC_STRATEGY => self.strategy.clone(),
            ENV_ENCRYPTION => self.encryption.map(|enabled| enabled.to_string()),
            ENV_SYNC_INTERVAL_SECS => self.sync_interval_secs.map(|secs| secs.to_string()),
            _ => None,
        }
    }

    fn normalize(&mut self) {
        self.remote_url = normalize_text_option(self.remote_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.app_folder = normalize_text_option(self.app_folder.take());
        self.backup_file = normalize_text_option(self.backup_file.take());
        self.strategy = normalize_text_option(self.strategy.take());
    }
}

/// Resolve sync settings for the active (or explicit) profile.
pub fn resolve_sync_settings(explicit_profile: Option<&str>) -> Result<SyncSettings, CliError> {
    let config = CliProfilesConfig::load()?;
    let profile_name = config.resolve_profile_name(explicit_profile);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    tracing::debug!("Resolving sync settings for profile '{profile_name}'");
    settings_for_profile(&profile_name, &profile, |key| std::env::var(key).ok())
}

/// Layer environment, then profile, then keychain secrets.
pub fn settings_for_profile(
    profile_name: &str,
    profile: &CliProfile,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SyncSettings, CliError> {
    let token = env(ENV_REMOTE_TOKEN)
        .or_else(|| stored_secret(profile_name, SecretKind::RemoteToken));
    let passphrase = env(ENV_ENCRYPTION_PASSPHRASE)
        .or_else(|| stored_secret(profile_name, SecretKind::Passphrase));

    Ok(parse_settings(|key| match key {
        ENV_REMOTE_TOKEN => token.clone(),
        ENV_ENCRYPTION_PASSPHRASE => passphrase.clone(),
        _ => env(key).or_else(|| profile.setting(key)),
    })?)
}

fn stored_secret(profile_name: &str, kind: SecretKind) -> Option<String> {
    match SecretStore::new(profile_name, kind).load() {
        Ok(secret) => secret,
        Err(error) => {
            tracing::warn!("Could not read {kind:?} from keychain: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;
    use stratus_core::MergeStrategy;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_normalizes_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some("default".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                remote_url: Some(" https://blobs.example.com/ ".to_string()),
                app_folder: Some("  ".to_string()),
                strategy: Some(" remote ".to_string()),
                ..CliProfile::default()
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        let profile = loaded.profiles.get("default").unwrap();
        assert_eq!(
            profile.remote_url.as_deref(),
            Some("https://blobs.example.com")
        );
        assert_eq!(profile.app_folder, None);
        assert_eq!(profile.strategy.as_deref(), Some("remote"));
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(config.resolve_profile_name(Some("laptop")), "laptop");
        assert_eq!(config.resolve_profile_name(None), "work");
    }

    #[test]
    fn environment_overrides_profile_and_keychain_fills_secrets() {
        let profile = CliProfile {
            remote_url: Some("https://profile.example.com".to_string()),
            strategy: Some("manual".to_string()),
            encryption: Some(true),
            ..CliProfile::default()
        };
        SecretStore::new("layering", SecretKind::RemoteToken)
            .save("kept-token")
            .unwrap();
        SecretStore::new("layering", SecretKind::Passphrase)
            .save("kept-passphrase")
            .unwrap();

        let env = HashMap::from([(ENV_SYNC_STRATEGY, "local")]);
        let settings = settings_for_profile("layering", &profile, |key| {
            env.get(key).map(|value| (*value).to_string())
        })
        .unwrap();

        let remote = settings.remote.unwrap();
        assert_eq!(remote.url, "https://profile.example.com");
        assert_eq!(remote.token, "kept-token");
        assert_eq!(settings.strategy, MergeStrategy::Local);
        assert!(settings.encryption.enabled);
        assert_eq!(
            settings.encryption.passphrase.as_deref(),
            Some("kept-passphrase")
        );
    }

    #[test]
    fn profile_url_without_token_is_rejected() {
        let profile = CliProfile {
            remote_url: Some("https://profile.example.com".to_string()),
            ..CliProfile::default()
        };
        let error = settings_for_profile("no-token", &profile, |_| None).unwrap_err();
        assert!(error.to_string().contains(ENV_REMOTE_TOKEN));
    }
}
