//! Credential storage for the API client.
//!
//! This module provides:
//! - `CredentialStore`: the key-value seam every backend implements
//! - `MemoryStore`, `FileStore`, `KeyringStore`: durable backends
//! - `CookieJar`: the cookie backend, with per-entry expiry
//! - `SyncedStore`: read-through, write-both decorator over a durable
//!   store and a cookie jar, owning the token pair lifecycle
//!
//! Access tokens live for 1 day (7 with "remember me"), refresh tokens for
//! 7 days (30 with "remember me").

pub mod cookies;
pub mod keychain;
pub mod profile;
pub mod store;
pub mod synced;

pub use cookies::CookieJar;
pub use keychain::KeyringStore;
pub use profile::CachedProfile;
pub use store::{CredentialStore, FileStore, MemoryStore};
pub use synced::{SyncedStore, TokenLifetime};

/// Storage key for the short-lived bearer credential
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the long-lived refresh credential
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage key recording whether the pair was issued with "remember me"
pub const REMEMBER_ME_KEY: &str = "rememberMe";

/// Server-issued session cookie, invalidated client-side on logout
pub const SESSION_COOKIE_KEY: &str = "sessionid";
