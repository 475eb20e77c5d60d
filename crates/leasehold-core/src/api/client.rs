//! Credentialed API client for the marketplace backend.
//!
//! Every request goes through `ApiClient::send`, which:
//!
//! 1. reads the access token (durable store first, then cookies) and
//!    mirrors it into whichever store lacks it
//! 2. attaches it as a bearer header
//! 3. on a first 401, refreshes the access token and resends once
//! 4. on a failed refresh, clears every credential and redirects to login

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::SyncedStore;
use crate::navigation::Navigator;

use super::request::{ApiRequest, Body, PendingRequest};
use super::transport::{ApiResponse, OutgoingRequest, ReqwestTransport, Transport};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Content type sent unless the body is multipart
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Endpoint exchanging a refresh token for a new access token
pub(crate) const REFRESH_PATH: &str = "/token/refresh";

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present when the backend rotates refresh tokens
    #[serde(default)]
    refresh: Option<String>,
}

/// API client for the marketplace backend.
/// Clone is cheap - clones share the transport, stores and refresh lock.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    store: SyncedStore,
    navigator: Arc<dyn Navigator>,
    /// Held for the duration of a token refresh
    refresh_lock: Arc<Mutex<()>>,
    /// Bumped whenever the session is torn down
    session_epoch: Arc<AtomicU64>,
}

impl ApiClient {
    /// Create a client over the default `reqwest` transport, sharing the
    /// store's cookie jar with it
    pub fn new(
        base_url: impl Into<String>,
        store: SyncedStore,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new(store.cookie_jar())?);
        Ok(Self::with_transport(base_url, transport, store, navigator))
    }

    pub fn with_transport(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: SyncedStore,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            store,
            navigator,
            refresh_lock: Arc::new(Mutex::new(())),
            session_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &SyncedStore {
        &self.store
    }

    /// Store a token pair in both backends
    pub fn set_auth_tokens(
        &self,
        access: &str,
        refresh: &str,
        remember_me: bool,
    ) -> Result<(), ApiError> {
        self.store.set_auth_tokens(access, refresh, remember_me)?;
        Ok(())
    }

    /// Remove every stored credential. Safe to call on an empty store.
    pub fn clear_auth_tokens(&self) -> Result<(), ApiError> {
        self.store.clear_auth_tokens()?;
        Ok(())
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        headers.insert(header::ACCEPT, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        headers
    }

    /// Resolve a request against the base URL and decorate its headers.
    fn prepare(&self, request: &ApiRequest, token: Option<&str>) -> Result<OutgoingRequest, ApiError> {
        let mut headers = Self::default_headers();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidRequest(format!("Invalid access token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        // The transport computes the multipart boundary itself
        if matches!(request.body, Body::Multipart(_)) {
            headers.remove(header::CONTENT_TYPE);
        }

        Ok(OutgoingRequest {
            method: request.method.clone(),
            url: self.url_for(&request.path),
            headers,
            body: request.body.clone(),
        })
    }

    /// Send a request with the stored credentials, refreshing once on 401.
    ///
    /// Success and redirect responses are returned unmodified; anything else
    /// becomes an `ApiError` after any recovery has run.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut pending = PendingRequest::new(request);

        loop {
            let epoch = self.session_epoch.load(Ordering::SeqCst);
            let token = self.store.synchronize();
            let outgoing = self.prepare(&pending.request, token.as_deref())?;
            let url = outgoing.url.clone();

            debug!(
                method = %outgoing.method,
                url = %url,
                attempt = ?pending.attempt,
                authenticated = token.is_some(),
                "Sending request"
            );

            let response = match self.transport.execute(outgoing).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(url = %url, error = %e, "No response received");
                    return Err(e);
                }
            };

            let status = response.status;
            if status.is_success() || status.is_redirection() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && pending.is_retry_eligible() {
                debug!(url = %url, "Access token rejected, refreshing");
                self.refresh_access_token(token.as_deref(), epoch).await?;
                pending = pending.into_retry();
                continue;
            }

            return Err(Self::classify_failure(&pending.request, &url, response));
        }
    }

    /// Send a request without credentials and without refresh handling.
    /// Used for the endpoints that issue credentials in the first place.
    pub(crate) async fn send_unauthenticated(
        &self,
        request: ApiRequest,
    ) -> Result<ApiResponse, ApiError> {
        let outgoing = self.prepare(&request, None)?;
        let url = outgoing.url.clone();
        let response = self.transport.execute(outgoing).await?;
        if response.status.is_success() || response.status.is_redirection() {
            Ok(response)
        } else {
            Err(Self::classify_failure(&request, &url, response))
        }
    }

    fn classify_failure(request: &ApiRequest, url: &str, response: ApiResponse) -> ApiError {
        let status = response.status;
        let body = response.text();
        let retry_after = response
            .headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match status.as_u16() {
            422 => warn!(
                method = %request.method,
                url = url,
                request_body = request.body_preview().as_deref().unwrap_or(""),
                response_body = %body,
                "Request rejected by validation"
            ),
            429 => warn!(
                url = url,
                retry_after = retry_after.as_deref().unwrap_or(""),
                "Rate limited"
            ),
            401 => warn!(url = url, "Still unauthorized after token refresh"),
            _ => debug!(url = url, status = status.as_u16(), "Request failed"),
        }

        ApiError::from_status(
            &request.method,
            url,
            request.body_preview(),
            status,
            retry_after,
            body,
        )
    }

    /// Obtain a new access token after `stale` was rejected.
    ///
    /// Refreshes are serialised: a caller that waited on another refresh
    /// reuses its result instead of hitting the refresh endpoint again, and
    /// a caller whose session ended after `epoch` was read fails without a
    /// second redirect.
    async fn refresh_access_token(&self, stale: Option<&str>, epoch: u64) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;

        if self.session_epoch.load(Ordering::SeqCst) != epoch {
            return Err(ApiError::SessionInvalid(
                "session ended while the request was in flight".to_string(),
            ));
        }

        match (stale, self.store.access_token()) {
            (Some(stale), Some(current)) if stale != current => {
                debug!("Access token already refreshed by a concurrent request");
                return Ok(());
            }
            (None, Some(_)) => {
                debug!("Access token stored while request was in flight");
                return Ok(());
            }
            (Some(_), None) => {
                return Err(ApiError::SessionInvalid(
                    "session was cleared while waiting for a token refresh".to_string(),
                ));
            }
            _ => {}
        }

        match self.exchange_refresh_token().await {
            Ok(()) => {
                info!("Access token refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.end_session();
                Err(e)
            }
        }
    }

    /// Call the refresh endpoint directly, outside the `send` pipeline.
    async fn exchange_refresh_token(&self) -> Result<(), ApiError> {
        let refresh = self
            .store
            .refresh_token()
            .ok_or_else(|| ApiError::SessionInvalid("no refresh token stored".to_string()))?;

        let body = serde_json::to_value(RefreshRequest { refresh: &refresh })
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let request = OutgoingRequest {
            method: Method::POST,
            url: self.url_for(REFRESH_PATH),
            headers: Self::default_headers(),
            body: Body::Json(body),
        };

        let response = self.transport.execute(request).await?;
        if !response.status.is_success() {
            return Err(ApiError::SessionInvalid(format!(
                "refresh token rejected with status {}",
                response.status
            )));
        }

        let refreshed: RefreshResponse = response.json()?;
        match refreshed.refresh {
            Some(rotated) => {
                let remember_me = self.store.remember_me();
                self.store.set_auth_tokens(&refreshed.access, &rotated, remember_me)?;
            }
            None => self.store.replace_access_token(&refreshed.access)?,
        }
        Ok(())
    }

    /// Mark every in-flight request's session as ended
    pub(crate) fn bump_session_epoch(&self) {
        self.session_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Wipe credentials and display cache, then send the user to login.
    fn end_session(&self) {
        self.bump_session_epoch();
        if let Err(e) = self.store.clear_auth_tokens() {
            warn!(error = %e, "Failed to clear credentials");
        }
        if let Err(e) = self.store.clear_profile_cache() {
            warn!(error = %e, "Failed to clear cached profile");
        }
        self.navigator.redirect_to_login();
    }

    // ===== JSON helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::put(path).json(body)?).await?.json()
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::patch(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
