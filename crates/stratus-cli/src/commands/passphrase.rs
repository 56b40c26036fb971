use std::io::{self, BufRead, IsTerminal, Write};

use crate::cli::PassphraseCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;
use crate::secrets::{SecretKind, SecretStore};

pub fn run_passphrase(
    command: PassphraseCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let profile_name = CliProfilesConfig::load()?.resolve_profile_name(global_profile);
    let store = SecretStore::new(&profile_name, SecretKind::Passphrase);

    match command {
        PassphraseCommands::Set { passphrase } => {
            let passphrase = match passphrase {
                Some(value) => value,
                None => read_passphrase_line()?,
            };
            let passphrase = normalize_passphrase(&passphrase)?;
            store.save(&passphrase)?;
            println!("Stored encryption passphrase for profile '{profile_name}'");
        }
        PassphraseCommands::Clear => {
            store.clear()?;
            println!("Cleared encryption passphrase for profile '{profile_name}'");
        }
        PassphraseCommands::Status => {
            let state = if store.load()?.is_some() {
                "stored"
            } else {
                "not stored"
            };
            println!("Encryption passphrase for profile '{profile_name}': {state}");
        }
    }
    Ok(())
}

/// Strip the line ending only; inner and edge spaces are part of the passphrase.
pub fn normalize_passphrase(raw: &str) -> Result<String, CliError> {
    let passphrase = raw.trim_end_matches(['\r', '\n']);
    if passphrase.is_empty() {
        Err(CliError::EmptyPassphrase)
    } else {
        Ok(passphrase.to_string())
    }
}

fn read_passphrase_line() -> Result<String, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("Passphrase: ");
        io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line)
}
