use reqwest::{Method, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// 401 on a request that was already retried after a refresh
    #[error("Unauthorized - token may be expired ({url})")]
    AuthenticationExpired { url: String, body: String },

    /// No usable refresh token, or the refresh endpoint rejected it
    #[error("Session is no longer valid: {0}")]
    SessionInvalid(String),

    #[error("Validation rejected by server for {method} {url}: {}", truncate_body(.body))]
    ValidationRejected {
        method: Method,
        url: String,
        request_body: Option<String>,
        status: StatusCode,
        body: String,
    },

    #[error("Rate limited - please wait before retrying ({url})")]
    RateLimited {
        url: String,
        retry_after: Option<String>,
    },

    #[error("No response received from {url}: {reason}")]
    NetworkUnavailable { url: String, reason: String },

    #[error("Status {status} from {url}: {}", truncate_body(.body))]
    Unclassified {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP client could not be constructed
    #[error("Client setup failed: {0}")]
    ClientSetup(String),

    #[error("Credential storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

impl ApiError {
    /// Classify a non-success response that has no recovery path left.
    pub fn from_status(
        method: &Method,
        url: &str,
        request_body: Option<String>,
        status: StatusCode,
        retry_after: Option<String>,
        body: String,
    ) -> Self {
        let url = url.to_string();
        match status.as_u16() {
            401 => ApiError::AuthenticationExpired { url, body },
            422 => ApiError::ValidationRejected {
                method: method.clone(),
                url,
                request_body,
                status,
                body,
            },
            429 => ApiError::RateLimited { url, retry_after },
            _ => ApiError::Unclassified { status, url, body },
        }
    }

    /// Callers are expected to back off on this error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// The session was torn down and the user must sign in again
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, ApiError::SessionInvalid(_))
    }

    /// HTTP status returned by the server, when there was one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::AuthenticationExpired { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::ValidationRejected { status, .. } | ApiError::Unclassified { status, .. } => {
                Some(*status)
            }
            ApiError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            _ => None,
        }
    }

    /// The server's error body parsed as JSON, for field-level messages
    pub fn body_json(&self) -> Option<serde_json::Value> {
        let body = match self {
            ApiError::AuthenticationExpired { body, .. }
            | ApiError::ValidationRejected { body, .. }
            | ApiError::Unclassified { body, .. } => body,
            _ => return None,
        };
        serde_json::from_str(body).ok()
    }
}
