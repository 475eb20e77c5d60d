//! Credentialed REST client for the marketplace backend.
//!
//! This module provides the `ApiClient`, which attaches the stored bearer
//! token to every request and, on a 401, exchanges the refresh token for a
//! new access token and resends the request once.
//!
//! The HTTP layer sits behind the `Transport` trait; `ReqwestTransport` is
//! the production implementation.

pub mod auth;
pub mod client;
pub mod error;
pub mod request;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use client::ApiClient;
pub use error::ApiError;
pub use request::{ApiRequest, Attempt, Body, FormPart, MultipartForm, PendingRequest};
pub use transport::{ApiResponse, OutgoingRequest, ReqwestTransport, Transport};
