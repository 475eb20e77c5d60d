//! Scripted transport and navigator for client tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;

use super::{ApiError, ApiResponse, OutgoingRequest, Transport};
use crate::navigation::Navigator;

type Handler = dyn Fn(&OutgoingRequest) -> Result<ApiResponse, ApiError> + Send + Sync;
type Delay = dyn Fn(&OutgoingRequest) -> usize + Send + Sync;

/// Transport answering every request through a closure and recording it.
///
/// Each exchange yields at least once so concurrent requests interleave.
pub(crate) struct MockTransport {
    handler: Box<Handler>,
    delay: Box<Delay>,
    requests: Mutex<Vec<OutgoingRequest>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&OutgoingRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(handler, |_| 1)
    }

    /// Like `new`, yielding `delay(request)` times before answering
    pub fn with_delay(
        handler: impl Fn(&OutgoingRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
        delay: impl Fn(&OutgoingRequest) -> usize + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay: Box::new(delay),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OutgoingRequest> {
        self.requests.lock().clone()
    }

    /// Number of recorded requests whose URL ends with `suffix`
    pub fn count(&self, suffix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().push(request.clone());
        for _ in 0..(self.delay)(&request).max(1) {
            tokio::task::yield_now().await;
        }
        (self.handler)(&request)
    }
}

/// Bearer token carried by a request, if any
pub(crate) fn bearer(request: &OutgoingRequest) -> Option<String> {
    request
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub(crate) fn respond(status: u16, body: serde_json::Value) -> Result<ApiResponse, ApiError> {
    let status = StatusCode::from_u16(status).expect("valid status code");
    Ok(ApiResponse::new(status, body.to_string()))
}

#[derive(Default)]
pub(crate) struct CountingNavigator {
    redirects: AtomicUsize,
}

impl CountingNavigator {
    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}
