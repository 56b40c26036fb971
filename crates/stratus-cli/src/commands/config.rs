use serde::Serialize;
use stratus_core::util::{normalize_base_url, normalize_text_option};
use stratus_core::MergeStrategy;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;
use crate::secrets::{SecretKind, SecretStore};

/// Explicit values passed to `config init`; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub remote_url: Option<String>,
    pub app_folder: Option<String>,
    pub backup_file: Option<String>,
    pub strategy: Option<MergeStrategy>,
    pub encryption: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView<'a> {
    name: &'a str,
    active: bool,
    #[serde(flatten)]
    profile: &'a CliProfile,
    remote_token_stored: bool,
    passphrase_stored: bool,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            remote_url,
            remote_token,
            app_folder,
            backup_file,
            strategy,
            encryption,
            no_activate,
        } => {
            let update = ProfileUpdate {
                remote_url,
                app_folder,
                backup_file,
                strategy: strategy.map(MergeStrategy::from),
                encryption,
            };
            run_config_init(
                profile.as_deref().or(global_profile),
                update,
                remote_token,
                no_activate,
            )
        }
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    remote_token: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load()?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    apply_profile_update(profile, update)?;
    let has_remote_url = profile.remote_url.is_some();

    if let Some(token) = normalize_text_option(remote_token) {
        SecretStore::new(&profile_name, SecretKind::RemoteToken).save(&token)?;
        println!("Stored remote token for profile '{profile_name}' in the OS keychain");
    }

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save()?;
    println!("Profile '{profile_name}' saved at {}", path.display());

    let has_token = SecretStore::new(&profile_name, SecretKind::RemoteToken)
        .load()?
        .is_some();
    match (has_remote_url, has_token) {
        (true, true) => println!("Sync is ready. Run `stratus sync`."),
        (true, false) => println!("Profile '{profile_name}' is missing a remote token."),
        (false, _) => println!("Profile '{profile_name}' has no remote URL; sync stays off."),
    }

    Ok(())
}

/// Merge explicit values into a stored profile.
pub fn apply_profile_update(profile: &mut CliProfile, update: ProfileUpdate) -> Result<(), CliError> {
    if let Some(url) = normalize_text_option(update.remote_url) {
        let url = normalize_base_url(&url).ok_or_else(|| {
            CliError::Config("remote_url must include http:// or https://".to_string())
        })?;
        profile.remote_url = Some(url);
    }
    if let Some(folder) = normalize_text_option(update.app_folder) {
        profile.app_folder = Some(folder);
    }
    if let Some(file) = normalize_text_option(update.backup_file) {
        profile.backup_file = Some(file);
    }
    if let Some(strategy) = update.strategy {
        profile.strategy = Some(strategy.as_str().to_string());
    }
    if let Some(enabled) = update.encryption {
        profile.encryption = Some(enabled);
    }
    Ok(())
}

pub fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load()?;
    let name = config.resolve_profile_name(global_profile);
    let profile = config.profile(&name).cloned().unwrap_or_default();

    let view = ProfileView {
        name: &name,
        active: config.active_profile.as_deref() == Some(name.as_str()),
        profile: &profile,
        remote_token_stored: SecretStore::new(&name, SecretKind::RemoteToken)
            .load()?
            .is_some(),
        passphrase_stored: SecretStore::new(&name, SecretKind::Passphrase)
            .load()?
            .is_some(),
    };
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
