//! Endpoints that create, inspect and end a session.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{OAuthCallback, OAuthOutcome, OAuthProvider, Registration, UserProfile};

use super::{ApiClient, ApiError, ApiRequest};

const TOKEN_PAIR_PATH: &str = "/token/pair";
const PROFILE_PATH: &str = "/users/profile";
const REGISTER_PATH: &str = "/users/register";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenPairResponse {
    access: String,
    refresh: String,
}

#[derive(Debug, Deserialize)]
struct OAuthCallbackResponse {
    #[serde(default)]
    user_exists: Option<bool>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

impl ApiClient {
    /// Exchange a username and password for a token pair and load the profile.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<UserProfile, ApiError> {
        self.obtain_token_pair(username, password, remember_me).await?;

        let profile = self.fetch_profile().await?;
        info!(username = %profile.username, role = %profile.role, "Signed in");
        Ok(profile)
    }

    async fn obtain_token_pair(
        &self,
        username: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<(), ApiError> {
        let request = ApiRequest::post(TOKEN_PAIR_PATH).json(&LoginRequest { username, password })?;
        let pair: TokenPairResponse = self.send_unauthenticated(request).await?.json()?;
        self.set_auth_tokens(&pair.access, &pair.refresh, remember_me)
    }

    /// Fetch the signed-in user's record and refresh the cached display fields.
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let profile: UserProfile = self.get_json(PROFILE_PATH).await?;
        self.store().cache_profile(&profile)?;
        Ok(profile)
    }

    /// Create an account and sign it in with the same credentials.
    ///
    /// The returned profile is the one served by `/users/profile` once the
    /// new token pair is stored.
    pub async fn register(
        &self,
        registration: &Registration,
        remember_me: bool,
    ) -> Result<UserProfile, ApiError> {
        let request = ApiRequest::post(REGISTER_PATH).json(registration)?;
        let user: UserProfile = self.send_unauthenticated(request).await?.json()?;
        info!(username = %user.username, role = %user.role, "Registered account");

        self.obtain_token_pair(&registration.username, &registration.password, remember_me)
            .await?;
        self.fetch_profile().await
    }

    /// Complete a provider sign-in.
    ///
    /// A first-time user gets `RoleSelectionRequired`; the caller then sends
    /// the callback again with `role` set.
    pub async fn oauth_callback(
        &self,
        provider: OAuthProvider,
        callback: &OAuthCallback,
        remember_me: bool,
    ) -> Result<OAuthOutcome, ApiError> {
        let request = ApiRequest::post(provider.callback_path()).json(callback)?;
        let response: OAuthCallbackResponse = self.send_unauthenticated(request).await?.json()?;

        if response.user_exists == Some(false) {
            return Ok(OAuthOutcome::RoleSelectionRequired);
        }

        let (Some(access), Some(refresh)) = (response.access_token, response.refresh_token) else {
            return Err(ApiError::InvalidResponse(
                "OAuth callback returned neither a role prompt nor tokens".to_string(),
            ));
        };
        self.set_auth_tokens(&access, &refresh, remember_me)?;

        let profile = match response.user {
            Some(user) => {
                self.store().cache_profile(&user)?;
                user
            }
            None => self.fetch_profile().await?,
        };
        info!(username = %profile.username, provider = ?provider, "Signed in with OAuth");
        Ok(OAuthOutcome::Authenticated(profile))
    }

    /// Forget the session locally. No request is sent.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.bump_session_epoch();
        self.clear_auth_tokens()?;
        self.store().clear_profile_cache()?;
        info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::header::AUTHORIZATION;
    use serde_json::json;

    use super::*;
    use crate::api::mock::{bearer, respond, CountingNavigator, MockTransport};
    use crate::api::request::Body;
    use crate::auth::{CookieJar, CredentialStore, MemoryStore, SyncedStore};
    use crate::models::Role;

    fn client(transport: Arc<MockTransport>) -> ApiClient {
        let store = SyncedStore::new(Arc::new(MemoryStore::new()), Arc::new(CookieJar::in_memory()));
        ApiClient::with_transport(
            "http://localhost:8002/api",
            transport,
            store,
            Arc::new(CountingNavigator::default()),
        )
    }

    fn profile_json() -> serde_json::Value {
        json!({
            "id": 3,
            "username": "landlord1",
            "email": "l1@example.com",
            "first_name": "Lee",
            "last_name": "Park",
            "role": "landlord",
            "phone": null
        })
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_caches_profile() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(TOKEN_PAIR_PATH) {
                respond(200, json!({"access": "AAA", "refresh": "RRR"}))
            } else if bearer(req).as_deref() == Some("AAA") {
                respond(200, profile_json())
            } else {
                respond(401, json!({}))
            }
        });
        let client = client(transport.clone());

        let profile = client.login("landlord1", "secret", true).await.unwrap();

        assert_eq!(profile.role, Role::Landlord);
        assert_eq!(client.store().access_token().as_deref(), Some("AAA"));
        assert!(client.store().remember_me());
        let cached = client.store().cached_profile().unwrap().unwrap();
        assert_eq!(cached.full_name, "Lee Park");

        let requests = transport.requests();
        assert!(requests[0].headers.get(AUTHORIZATION).is_none());
        match &requests[0].body {
            Body::Json(body) => assert_eq!(body["username"], "landlord1"),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_bad_credentials_does_not_refresh() {
        let transport = MockTransport::new(|_| respond(401, json!({"detail": "No active account"})));
        let client = client(transport.clone());

        let err = client.login("nobody", "wrong", false).await.unwrap_err();

        assert!(matches!(err, ApiError::AuthenticationExpired { .. }));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_oauth_role_selection_prompt() {
        let transport = MockTransport::new(|_| respond(200, json!({"user_exists": false, "email": "new@example.com"})));
        let client = client(transport);
        let callback = OAuthCallback {
            code: "code-123".to_string(),
            state: None,
            role: None,
        };

        let outcome = client
            .oauth_callback(OAuthProvider::Google, &callback, false)
            .await
            .unwrap();

        assert_eq!(outcome, OAuthOutcome::RoleSelectionRequired);
        assert_eq!(client.store().access_token(), None);
    }

    #[tokio::test]
    async fn test_oauth_authenticated() {
        let transport = MockTransport::new(|_| {
            respond(200, json!({
                "user_exists": true,
                "access_token": "GA",
                "refresh_token": "GR",
                "user": profile_json()
            }))
        });
        let client = client(transport.clone());
        let callback = OAuthCallback {
            code: "code-456".to_string(),
            state: Some("xyz".to_string()),
            role: Some(Role::Landlord),
        };

        let outcome = client
            .oauth_callback(OAuthProvider::Twitter, &callback, false)
            .await
            .unwrap();

        match outcome {
            OAuthOutcome::Authenticated(profile) => assert_eq!(profile.username, "landlord1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(client.store().refresh_token().as_deref(), Some("GR"));
        assert!(transport.requests()[0].url.ends_with("/users/oauth/twitter/callback"));
    }

    #[tokio::test]
    async fn test_register_signs_in_new_account() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(REGISTER_PATH) {
                respond(201, profile_json())
            } else if req.url.ends_with(TOKEN_PAIR_PATH) {
                respond(200, json!({"access": "NA", "refresh": "NR"}))
            } else if bearer(req).as_deref() == Some("NA") {
                respond(200, profile_json())
            } else {
                respond(401, json!({}))
            }
        });
        let client = client(transport.clone());
        let registration = Registration {
            username: "landlord1".to_string(),
            email: "l1@example.com".to_string(),
            password: "secret".to_string(),
            first_name: "Lee".to_string(),
            last_name: "Park".to_string(),
            role: Role::Landlord,
            phone: None,
        };

        let user = client.register(&registration, false).await.unwrap();

        assert_eq!(user.id, 3);
        assert_eq!(client.store().access_token().as_deref(), Some("NA"));
        assert_eq!(client.store().refresh_token().as_deref(), Some("NR"));
        assert_eq!(client.store().cookies().get("accessToken").unwrap().as_deref(), Some("NA"));
        let cached = client.store().cached_profile().unwrap().unwrap();
        assert_eq!(cached.username, "landlord1");

        // Token pair is requested with the registration credentials
        let pair_request = transport
            .requests()
            .into_iter()
            .find(|r| r.url.ends_with(TOKEN_PAIR_PATH))
            .unwrap();
        match pair_request.body {
            Body::Json(ref body) => {
                assert_eq!(body["username"], "landlord1");
                assert_eq!(body["password"], "secret");
            }
            ref other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_rejected_stores_nothing() {
        let transport = MockTransport::new(|_| {
            respond(422, json!({"username": ["A user with that username already exists."]}))
        });
        let client = client(transport.clone());
        let registration = Registration {
            username: "taken".to_string(),
            email: "t@example.com".to_string(),
            password: "secret".to_string(),
            first_name: "T".to_string(),
            last_name: "K".to_string(),
            role: Role::Tenant,
            phone: None,
        };

        let err = client.register(&registration, false).await.unwrap_err();

        assert!(matches!(err, ApiError::ValidationRejected { .. }));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(client.store().access_token(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let transport = MockTransport::new(|_| respond(200, profile_json()));
        let client = client(transport);
        client.set_auth_tokens("AAA", "RRR", false).unwrap();
        client.fetch_profile().await.unwrap();

        client.logout().unwrap();
        client.logout().unwrap();

        assert_eq!(client.store().access_token(), None);
        assert_eq!(client.store().refresh_token(), None);
        assert_eq!(client.store().cached_profile().unwrap(), None);
    }
}
