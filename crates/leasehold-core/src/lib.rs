//! Core library for the leasehold rental marketplace client.
//!
//! This crate owns the credential lifecycle shared by every caller of the
//! marketplace REST API:
//!
//! - `auth`: durable and cookie credential stores, kept in sync by `SyncedStore`
//! - `api`: the credentialed `ApiClient` with transparent refresh-and-retry
//! - `models`: user records returned by the auth endpoints
//! - `navigation`: role to route lookup and the login redirect hook
//! - `config`: base URL and on-disk locations

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse};
pub use auth::{CookieJar, CredentialStore, FileStore, KeyringStore, MemoryStore, SyncedStore};
pub use config::Config;
pub use models::{Role, UserProfile};
pub use navigation::Navigator;
