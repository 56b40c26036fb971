//! Keychain-backed storage for the remote token and the encryption passphrase.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock, PoisonError};

#[cfg(not(test))]
use keyring::Entry;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "stratus-cli";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecretKind {
    RemoteToken,
    Passphrase,
}

impl SecretKind {
    const fn label(self) -> &'static str {
        match self {
            Self::RemoteToken => "remote_token",
            Self::Passphrase => "encryption_passphrase",
        }
    }
}

/// One secret slot for one profile.
#[derive(Clone)]
pub struct SecretStore {
    username: String,
}

impl SecretStore {
    pub fn new(profile_name: &str, kind: SecretKind) -> Self {
        Self {
            username: format!("{}:{profile_name}", kind.label()),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> Result<Entry, CliError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| CliError::Keychain(error.to_string()))
    }

    #[cfg(not(test))]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(CliError::Keychain(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn load(&self) -> Result<Option<String>, CliError> {
        let guard = Self::test_store()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(&self.username).cloned())
    }

    #[cfg(not(test))]
    pub fn save(&self, secret: &str) -> Result<(), CliError> {
        self.entry()?
            .set_password(secret)
            .map_err(|error| CliError::Keychain(error.to_string()))
    }

    #[cfg(test)]
    pub fn save(&self, secret: &str) -> Result<(), CliError> {
        Self::test_store()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.username.clone(), secret.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    pub fn clear(&self) -> Result<(), CliError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(CliError::Keychain(error.to_string())),
        }
    }

    #[cfg(test)]
    pub fn clear(&self) -> Result<(), CliError> {
        Self::test_store()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.username);
        Ok(())
    }
}
