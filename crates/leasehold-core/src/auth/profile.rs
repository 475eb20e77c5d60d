//! Display fields cached alongside the tokens.
//!
//! Callers show the username, full name and role without a profile
//! round-trip. These entries are a denormalized copy of `UserProfile` and
//! are wiped together with the tokens.

use anyhow::Result;

use crate::models::{Role, UserProfile};

use super::{CredentialStore, SyncedStore};

const USERNAME_KEY: &str = "username";
const FULL_NAME_KEY: &str = "fullName";
const USER_ROLE_KEY: &str = "userRole";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedProfile {
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

impl SyncedStore {
    pub fn cache_profile(&self, profile: &UserProfile) -> Result<()> {
        let store = self.durable();
        store.set(USERNAME_KEY, &profile.username, None)?;
        store.set(FULL_NAME_KEY, &profile.full_name(), None)?;
        store.set(USER_ROLE_KEY, profile.role.as_str(), None)?;
        Ok(())
    }

    /// The cached display fields, if a username has been cached
    pub fn cached_profile(&self) -> Result<Option<CachedProfile>> {
        let store = self.durable();
        let Some(username) = store.get(USERNAME_KEY)? else {
            return Ok(None);
        };
        let full_name = store.get(FULL_NAME_KEY)?.unwrap_or_else(|| username.clone());
        let role = store
            .get(USER_ROLE_KEY)?
            .and_then(|r| r.parse().ok())
            .unwrap_or_default();
        Ok(Some(CachedProfile {
            username,
            full_name,
            role,
        }))
    }

    pub fn clear_profile_cache(&self) -> Result<()> {
        let store = self.durable();
        for key in [USERNAME_KEY, FULL_NAME_KEY, USER_ROLE_KEY] {
            store.remove(key)?;
        }
        Ok(())
    }
}
