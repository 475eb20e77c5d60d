use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tracing::{debug, warn};

use super::{
    CookieJar, CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, REMEMBER_ME_KEY, SESSION_COOKIE_KEY,
};

/// Keys removed from both backends when the session ends
const CLEARED_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    REMEMBER_ME_KEY,
    SESSION_COOKIE_KEY,
];

/// Cookie lifetimes for a token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetime {
    pub access: Duration,
    pub refresh: Duration,
}

impl TokenLifetime {
    /// 1 day access / 7 day refresh, or 7 / 30 days with "remember me"
    pub fn for_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Self {
                access: Duration::days(7),
                refresh: Duration::days(30),
            }
        } else {
            Self {
                access: Duration::days(1),
                refresh: Duration::days(7),
            }
        }
    }
}

/// Read-through, write-both view over a durable store and a cookie jar.
///
/// Neither backend is authoritative. Reads prefer the durable store and
/// fall back to cookies; `synchronize` copies a token found in only one
/// backend into the other.
///
/// The cookie jar is shared with the HTTP transport, so server-set cookies
/// live in the same jar that `clear_auth_tokens` empties.
#[derive(Clone)]
pub struct SyncedStore {
    durable: Arc<dyn CredentialStore>,
    cookies: Arc<CookieJar>,
}

impl SyncedStore {
    pub fn new(durable: Arc<dyn CredentialStore>, cookies: Arc<CookieJar>) -> Self {
        Self { durable, cookies }
    }

    pub fn durable(&self) -> &dyn CredentialStore {
        self.durable.as_ref()
    }

    pub fn cookies(&self) -> &CookieJar {
        self.cookies.as_ref()
    }

    /// Handle to the jar, for wiring it into an HTTP transport
    pub fn cookie_jar(&self) -> Arc<CookieJar> {
        Arc::clone(&self.cookies)
    }

    /// Read a key from one backend, treating a backend failure as absence.
    fn read(store: &dyn CredentialStore, key: &str) -> Option<String> {
        match store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(store = store.name(), key = key, error = %e, "Credential read failed");
                None
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        Self::read(self.durable(), key).or_else(|| Self::read(self.cookies(), key))
    }

    pub fn access_token(&self) -> Option<String> {
        self.lookup(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lookup(REFRESH_TOKEN_KEY)
    }

    /// Whether the current pair was stored with "remember me"
    pub fn remember_me(&self) -> bool {
        self.lookup(REMEMBER_ME_KEY)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Lifetimes chosen when the current pair was stored
    pub fn lifetime(&self) -> TokenLifetime {
        TokenLifetime::for_remember_me(self.remember_me())
    }

    /// Return the current access token, mirroring it into whichever backend
    /// lacks it. Repair is best-effort: write failures are logged only.
    pub fn synchronize(&self) -> Option<String> {
        let in_durable = Self::read(self.durable(), ACCESS_TOKEN_KEY);
        let in_cookies = Self::read(self.cookies(), ACCESS_TOKEN_KEY);

        match (in_durable, in_cookies) {
            (Some(token), Some(_)) => Some(token),
            (Some(token), None) => {
                self.mirror(self.durable(), self.cookies(), &token);
                Some(token)
            }
            (None, Some(token)) => {
                self.mirror(self.cookies(), self.durable(), &token);
                Some(token)
            }
            (None, None) => None,
        }
    }

    /// Copy an access token, and its paired refresh token when `from` has one.
    fn mirror(&self, from: &dyn CredentialStore, to: &dyn CredentialStore, access: &str) {
        let lifetime = self.lifetime();
        debug!(from = from.name(), to = to.name(), "Mirroring access token");

        if let Err(e) = to.set(ACCESS_TOKEN_KEY, access, Some(lifetime.access)) {
            warn!(store = to.name(), error = %e, "Failed to mirror access token");
            return;
        }
        if let Some(refresh) = Self::read(from, REFRESH_TOKEN_KEY) {
            if let Err(e) = to.set(REFRESH_TOKEN_KEY, &refresh, Some(lifetime.refresh)) {
                warn!(store = to.name(), error = %e, "Failed to mirror refresh token");
            }
        }
    }

    /// Store a freshly issued token pair in both backends.
    pub fn set_auth_tokens(&self, access: &str, refresh: &str, remember_me: bool) -> Result<()> {
        let lifetime = TokenLifetime::for_remember_me(remember_me);

        self.durable.set(ACCESS_TOKEN_KEY, access, None)?;
        self.durable.set(REFRESH_TOKEN_KEY, refresh, None)?;
        self.durable
            .set(REMEMBER_ME_KEY, if remember_me { "true" } else { "false" }, None)?;

        self.cookies.set(ACCESS_TOKEN_KEY, access, Some(lifetime.access))?;
        self.cookies.set(REFRESH_TOKEN_KEY, refresh, Some(lifetime.refresh))?;

        debug!(remember_me = remember_me, "Stored token pair");
        Ok(())
    }

    /// Replace the access token after a refresh, keeping the refresh token.
    pub fn replace_access_token(&self, access: &str) -> Result<()> {
        let lifetime = self.lifetime();
        self.durable.set(ACCESS_TOKEN_KEY, access, None)?;
        self.cookies.set(ACCESS_TOKEN_KEY, access, Some(lifetime.access))?;
        Ok(())
    }

    /// Remove every credential from both backends.
    ///
    /// Every key is attempted even if one removal fails; the first failure
    /// is returned.
    pub fn clear_auth_tokens(&self) -> Result<()> {
        let mut result = Ok(());
        let stores: [&dyn CredentialStore; 2] = [self.durable(), self.cookies()];
        for store in stores {
            for key in CLEARED_KEYS {
                if let Err(e) = store.remove(key) {
                    warn!(store = store.name(), key = key, error = %e, "Failed to clear credential");
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        debug!("Cleared stored credentials");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;
    use chrono::{DateTime, Utc};
    use reqwest::cookie::CookieStore;
    use reqwest::header::HeaderValue;
    use reqwest::Url;

    fn stores() -> (Arc<MemoryStore>, Arc<CookieJar>, SyncedStore) {
        let durable = Arc::new(MemoryStore::new());
        let cookies = Arc::new(CookieJar::in_memory());
        let synced = SyncedStore::new(durable.clone(), cookies.clone());
        (durable, cookies, synced)
    }

    fn assert_expires_in(expires: Option<DateTime<Utc>>, expected: Duration) {
        let remaining = expires.expect("cookie should carry an expiry") - Utc::now();
        assert!(remaining <= expected, "expiry {remaining} exceeds {expected}");
        assert!(remaining > expected - Duration::minutes(1), "expiry {remaining} too short");
    }

    #[test]
    fn test_set_auth_tokens_remember_me() {
        let (durable, cookies, synced) = stores();
        synced.set_auth_tokens("AAA", "RRR", true).unwrap();

        assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("AAA"));
        assert_eq!(durable.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("RRR"));
        assert_eq!(cookies.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("AAA"));
        assert_eq!(cookies.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("RRR"));
        assert_expires_in(cookies.expires_at(ACCESS_TOKEN_KEY), Duration::days(7));
        assert_expires_in(cookies.expires_at(REFRESH_TOKEN_KEY), Duration::days(30));
    }

    #[test]
    fn test_set_auth_tokens_twice_is_idempotent() {
        let (durable, cookies, synced) = stores();
        synced.set_auth_tokens("a", "r", false).unwrap();
        synced.set_auth_tokens("a", "r", false).unwrap();

        assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a"));
        assert_eq!(durable.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r"));
        assert_eq!(cookies.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a"));
        assert_eq!(cookies.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r"));
        assert_expires_in(cookies.expires_at(ACCESS_TOKEN_KEY), Duration::days(1));
        assert_expires_in(cookies.expires_at(REFRESH_TOKEN_KEY), Duration::days(7));
    }

    #[test]
    fn test_clear_auth_tokens_on_empty_store_twice() {
        let (durable, cookies, synced) = stores();
        synced.clear_auth_tokens().unwrap();
        synced.clear_auth_tokens().unwrap();
        assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(cookies.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_clear_auth_tokens_removes_session_cookie() {
        let (durable, cookies, synced) = stores();
        synced.set_auth_tokens("AAA", "RRR", true).unwrap();
        let url = Url::parse("http://localhost:8002/api/token/pair").unwrap();
        let headers = [HeaderValue::from_static("sessionid=server-session; Path=/; HttpOnly")];
        cookies.set_cookies(&mut headers.iter(), &url);
        assert_eq!(cookies.get(SESSION_COOKIE_KEY).unwrap().as_deref(), Some("server-session"));

        synced.clear_auth_tokens().unwrap();

        assert!(cookies.cookies(&url).is_none(), "cleared jar must send no cookies");

        for key in CLEARED_KEYS {
            assert_eq!(durable.get(key).unwrap(), None, "durable still holds {key}");
            assert_eq!(cookies.get(key).unwrap(), None, "cookies still hold {key}");
        }
        assert_eq!(synced.access_token(), None);
    }

    #[test]
    fn test_synchronize_durable_to_cookies() {
        let (durable, cookies, synced) = stores();
        durable.set(ACCESS_TOKEN_KEY, "AAA", None).unwrap();
        durable.set(REFRESH_TOKEN_KEY, "RRR", None).unwrap();

        assert_eq!(synced.synchronize().as_deref(), Some("AAA"));
        assert_eq!(cookies.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("AAA"));
        assert_eq!(cookies.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("RRR"));
        assert_expires_in(cookies.expires_at(ACCESS_TOKEN_KEY), Duration::days(1));
    }

    #[test]
    fn test_synchronize_cookies_to_durable() {
        let (durable, _cookies, synced) = stores();
        synced.cookies().set(ACCESS_TOKEN_KEY, "XYZ", Some(Duration::days(1))).unwrap();

        assert_eq!(synced.synchronize().as_deref(), Some("XYZ"));
        assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("XYZ"));
        // No refresh token to copy
        assert_eq!(durable.get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_synchronize_prefers_durable_when_both_present() {
        let (_durable, cookies, synced) = stores();
        synced.durable().set(ACCESS_TOKEN_KEY, "DURABLE", None).unwrap();
        cookies.set(ACCESS_TOKEN_KEY, "COOKIE", None).unwrap();

        assert_eq!(synced.synchronize().as_deref(), Some("DURABLE"));
        assert_eq!(cookies.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("COOKIE"));
    }

    #[test]
    fn test_replace_access_token_keeps_remember_me_lifetime() {
        let (durable, cookies, synced) = stores();
        synced.set_auth_tokens("OLD", "RRR", true).unwrap();

        synced.replace_access_token("NEW").unwrap();

        assert_eq!(durable.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("NEW"));
        assert_eq!(cookies.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("NEW"));
        assert_eq!(synced.refresh_token().as_deref(), Some("RRR"));
        assert_expires_in(cookies.expires_at(ACCESS_TOKEN_KEY), Duration::days(7));
    }

    #[test]
    fn test_token_lifetimes() {
        assert_eq!(TokenLifetime::for_remember_me(false).access, Duration::days(1));
        assert_eq!(TokenLifetime::for_remember_me(false).refresh, Duration::days(7));
        assert_eq!(TokenLifetime::for_remember_me(true).access, Duration::days(7));
        assert_eq!(TokenLifetime::for_remember_me(true).refresh, Duration::days(30));
    }
}
