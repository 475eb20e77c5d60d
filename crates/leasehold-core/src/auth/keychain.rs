use std::collections::hash_map::{self, HashMap};

use anyhow::{Context, Result};
use chrono::Duration;
use keyring::Entry;
use parking_lot::Mutex;

use super::CredentialStore;

const SERVICE_NAME: &str = "leasehold";

/// Durable store backed by the OS keychain, one entry per key.
///
/// Entries are created once per key and reused for later reads and writes.
pub struct KeyringStore {
    service: String,
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom keychain service name (useful for separate profiles)
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Run `op` against the keychain entry for `key`
    fn with_entry<T>(
        &self,
        key: &str,
        op: impl FnOnce(&Entry) -> keyring::Result<T>,
    ) -> Result<keyring::Result<T>> {
        let mut entries = self.entries.lock();
        let entry = match entries.entry(key.to_string()) {
            hash_map::Entry::Occupied(slot) => slot.into_mut(),
            hash_map::Entry::Vacant(slot) => {
                let entry = Entry::new(&self.service, key).context("Failed to create keyring entry")?;
                slot.insert(entry)
            }
        };
        Ok(op(entry))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.with_entry(key, |entry| entry.get_password())? {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<()> {
        self.with_entry(key, |entry| entry.set_password(value))?
            .context("Failed to store credential in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.with_entry(key, |entry| entry.delete_credential())? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}
