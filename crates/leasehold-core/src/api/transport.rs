//! HTTP transport seam.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::request::{Body, FormPart, MultipartForm};
use super::ApiError;
use crate::auth::CookieJar;

/// A fully resolved request, ready for the wire.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Response as received, body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e))
        })
    }
}

/// Executes one HTTP exchange. Implementations must not retry.
///
/// A failure to obtain any response is `ApiError::NetworkUnavailable`; every
/// response, whatever its status, is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: OutgoingRequest) -> Result<ApiResponse, ApiError>;
}

/// Production transport over `reqwest`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport whose cookies live in `cookies`.
    ///
    /// Server-set cookies are written to the jar and the jar's live entries
    /// are sent with every request. No timeout is configured; callers
    /// needing one wrap the call.
    pub fn new(cookies: Arc<CookieJar>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .cookie_provider(cookies)
            .build()
            .map_err(|e| ApiError::ClientSetup(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn build_form(form: &MultipartForm) -> Result<Form, ApiError> {
        let mut out = Form::new();
        for part in &form.parts {
            out = match part {
                FormPart::Text { name, value } => out.text(name.clone(), value.clone()),
                FormPart::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => {
                    let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        file = file.mime_str(mime).map_err(|e| {
                            ApiError::InvalidRequest(format!("Invalid MIME type {}: {}", mime, e))
                        })?;
                    }
                    out.part(name.clone(), file)
                }
            };
        }
        Ok(out)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<ApiResponse, ApiError> {
        let OutgoingRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method.clone(), &url).headers(headers);
        builder = match body {
            Body::Empty => builder,
            Body::Json(ref value) => builder.json(value),
            Body::Multipart(ref form) => builder.multipart(Self::build_form(form)?),
        };

        let response = builder.send().await.map_err(|e| ApiError::NetworkUnavailable {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| {
                ApiError::InvalidResponse(format!(
                    "Failed to read {} response body from {}: {}",
                    status, url, e
                ))
            })?
            .to_vec();

        debug!(method = %method, url = %url, status = status.as_u16(), "HTTP exchange complete");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
