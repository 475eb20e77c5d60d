use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CredentialStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cookie {
    value: String,
    /// `None` is a session cookie with no explicit expiry
    expires_at: Option<DateTime<Utc>>,
}

impl Cookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Cookie-backed credential store.
///
/// Unlike the durable stores every entry can carry an expiry; expired
/// entries read as absent and are purged on access. When opened with a
/// path the jar is persisted as JSON.
///
/// The jar is also the HTTP transport's cookie provider: cookies the server
/// sets are stored here and every live entry is sent back, so clearing the
/// jar is what stops a session cookie from going out. Scoping is per jar,
/// not per domain, since a client talks to a single backend.
pub struct CookieJar {
    path: Option<PathBuf>,
    cookies: Mutex<HashMap<String, Cookie>>,
}

impl CookieJar {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cookies: Mutex::new(HashMap::new()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cookies = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read cookie jar {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse cookie jar")?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: Some(path),
            cookies: Mutex::new(cookies),
        })
    }

    /// Expiry of a live cookie, if it has one
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        self.cookies
            .lock()
            .get(key)
            .filter(|c| !c.is_expired(now))
            .and_then(|c| c.expires_at)
    }

    fn persist(&self, cookies: &HashMap<String, Cookie>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(cookies)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write cookie jar {}", path.display()))?;
        Ok(())
    }
}

/// Parse one `Set-Cookie` header into `(name, cookie)`.
///
/// `Max-Age` wins over `Expires`; a cookie already expired on arrival is
/// returned so the caller can delete it.
fn parse_set_cookie(header: &str, now: DateTime<Utc>) -> Option<(String, Cookie)> {
    let mut attributes = header.split(';');
    let (name, value) = attributes.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut max_age = None;
    let mut expires = None;
    for attribute in attributes {
        let (key, val) = match attribute.split_once('=') {
            Some((key, val)) => (key.trim(), val.trim()),
            None => (attribute.trim(), ""),
        };
        if key.eq_ignore_ascii_case("max-age") {
            max_age = val.parse::<i64>().ok().map(|secs| now + Duration::seconds(secs));
        } else if key.eq_ignore_ascii_case("expires") {
            expires = DateTime::parse_from_rfc2822(val)
                .ok()
                .map(|at| at.with_timezone(&Utc));
        }
    }

    let cookie = Cookie {
        value: value.trim().trim_matches('"').to_string(),
        expires_at: max_age.or(expires),
    };
    Some((name.to_string(), cookie))
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, _url: &Url) {
        let now = Utc::now();
        let mut cookies = self.cookies.lock();
        for header in cookie_headers {
            let Some((name, cookie)) = header.to_str().ok().and_then(|h| parse_set_cookie(h, now))
            else {
                warn!("Ignoring malformed Set-Cookie header");
                continue;
            };
            if cookie.is_expired(now) || cookie.value.is_empty() {
                debug!(cookie = %name, "Server removed cookie");
                cookies.remove(&name);
            } else {
                debug!(cookie = %name, "Server set cookie");
                cookies.insert(name, cookie);
            }
        }
        if let Err(e) = self.persist(&cookies) {
            warn!(error = %e, "Failed to persist cookie jar");
        }
    }

    fn cookies(&self, _url: &Url) -> Option<HeaderValue> {
        let now = Utc::now();
        let cookies = self.cookies.lock();
        let mut pairs: Vec<String> = cookies
            .iter()
            .filter(|(_, c)| !c.is_expired(now))
            .map(|(name, c)| format!("{}={}", name, c.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        match HeaderValue::from_str(&pairs.join("; ")) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Stored cookies are not a valid header value");
                None
            }
        }
    }
}

impl CredentialStore for CookieJar {
    fn name(&self) -> &'static str {
        "cookies"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let mut cookies = self.cookies.lock();
        match cookies.get(key) {
            Some(cookie) if cookie.is_expired(now) => {
                debug!(cookie = key, "Dropping expired cookie");
                cookies.remove(key);
                self.persist(&cookies)?;
                Ok(None)
            }
            Some(cookie) => Ok(Some(cookie.value.clone())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let cookie = Cookie {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Utc::now() + ttl),
        };
        let mut cookies = self.cookies.lock();
        cookies.insert(key.to_string(), cookie);
        self.persist(&cookies)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut cookies = self.cookies.lock();
        if cookies.remove(key).is_some() {
            self.persist(&cookies)?;
        }
        Ok(())
    }
}
