//! Navigation hooks owned outside the HTTP client.
//!
//! The client never decides where a user lands; it only signals that the
//! session is gone through `Navigator`. Role landing pages live in one
//! lookup table here instead of being spelled out by every caller.

use crate::models::Role;

/// Entry point shown when no session exists
pub const LOGIN_ROUTE: &str = "/login";

const ROLE_ROUTES: &[(Role, &str)] = &[
    (Role::Tenant, "/tenant/dashboard"),
    (Role::Landlord, "/landlord/dashboard"),
    (Role::Admin, "/admin/dashboard"),
];

/// Landing page after sign-in for a role
pub fn home_route(role: Role) -> &'static str {
    ROLE_ROUTES
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, route)| *route)
        .unwrap_or("/")
}

/// Receiver of forced navigation when the session can no longer be renewed.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}
