//! Data models returned by the marketplace auth endpoints.
//!
//! - `UserProfile`: the account record behind the current session
//! - `Role`: tenant, landlord or admin
//! - `Registration`, `OAuthCallback`, `OAuthOutcome`: auth request/response shapes

pub mod user;

pub use user::{OAuthCallback, OAuthOutcome, OAuthProvider, Registration, Role, UserProfile};
