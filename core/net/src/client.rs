//! HTTP transport with the retry and auth contract shared by every endpoint.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use spendsync_common::{Error, Result};

use crate::connectivity::ConnectivityMonitor;
use crate::token::TokenStore;

/// Total time budget for one request, including retries inside reqwest.
const RESOURCE_TIMEOUT: Duration = Duration::from_secs(45);
/// Budget for establishing the connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Backoff after a 5xx before the next attempt.
const SERVER_ERROR_BACKOFF: Duration = Duration::from_secs(1);
/// Backoff after a timeout before the next attempt.
const TIMEOUT_BACKOFF: Duration = Duration::from_secs(2);

/// Per-request retry budget. 5xx responses earn up to `retry_count`
/// extra attempts with a 1 s pause; a timeout earns exactly one extra
/// attempt with a 2 s pause, independent of `retry_count`.
struct RetryState {
    server_errors: u32,
    timed_out: bool,
}

impl RetryState {
    fn new() -> Self {
        Self {
            server_errors: 0,
            timed_out: false,
        }
    }

    fn on_server_error(&mut self, retry_count: u32) -> Option<Duration> {
        if self.server_errors < retry_count {
            self.server_errors += 1;
            Some(SERVER_ERROR_BACKOFF)
        } else {
            None
        }
    }

    fn on_timeout(&mut self) -> Option<Duration> {
        if self.timed_out {
            None
        } else {
            self.timed_out = true;
            Some(TIMEOUT_BACKOFF)
        }
    }
}

/// Thin wrapper over `reqwest` that enforces the request contract:
/// connectivity gate, bearer auth, bounded retries for transient failures,
/// and a single error taxonomy for callers.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    connectivity: ConnectivityMonitor,
    retry_count: u32,
}

impl ApiClient {
    /// `base_url` is prepended verbatim to endpoint paths, so it may carry
    /// a path segment such as `/api` without losing it.
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<TokenStore>,
        connectivity: ConnectivityMonitor,
        retry_count: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(RESOURCE_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Unknown(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            connectivity,
            retry_count,
        })
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None, true).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        self.request(Method::POST, path, Some(body), true).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        self.request(Method::PATCH, path, Some(body), true).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::DELETE, path, None, true).await
    }

    /// Unauthenticated POST, used by login and register.
    pub async fn post_public<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        self.request(Method::POST, path, Some(body), false).await
    }

    /// Unauthenticated GET that bypasses the connectivity gate. Used by
    /// the health probe, which must be able to observe recovery while the
    /// monitor still says offline.
    pub async fn probe<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request_inner(Method::GET, path, None, false).await
    }

    /// One logical request. Fails fast when offline or when auth is
    /// required but no token is held; retries 5xx up to `retry_count`
    /// extra attempts and timeouts once; a 401 clears the stored token.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        requires_auth: bool,
    ) -> Result<T> {
        if !self.connectivity.is_connected() {
            return Err(Error::NoConnectivity);
        }
        self.request_inner(method, path, body, requires_auth).await
    }

    async fn request_inner<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        requires_auth: bool,
    ) -> Result<T> {
        let url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| Error::InvalidRequest(format!("bad url for {path}: {e}")))?;

        let token = if requires_auth {
            match self.tokens.get() {
                Some(t) => Some(t),
                None => return Err(Error::Unauthorized),
            }
        } else {
            None
        };

        let mut retries = RetryState::new();
        loop {
            let mut builder = self.http.request(method.clone(), url.clone());
            if let Some(token) = &token {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            debug!(%method, %url, "sending request");
            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return decode_body(response).await;
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        warn!(%url, "request rejected with 401, clearing token");
                        self.tokens.clear();
                        return Err(Error::Unauthorized);
                    }
                    if status.is_server_error() {
                        if let Some(backoff) = retries.on_server_error(self.retry_count) {
                            warn!(%url, %status, "server error, retrying");
                            tokio::time::sleep(backoff).await;
                            continue;
                        }
                        return Err(Error::ServerError(status.as_u16()));
                    }
                    let detail = response.text().await.unwrap_or_default();
                    warn!(%url, %status, detail, "request rejected");
                    return Err(Error::ServerError(status.as_u16()));
                }
                Err(e) if e.is_timeout() => {
                    if let Some(backoff) = retries.on_timeout() {
                        warn!(%url, "request timed out, retrying");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(Error::Timeout);
                }
                Err(e) if e.is_connect() => {
                    // Losing the link mid-flight is offline, not a dead server.
                    if !self.connectivity.is_connected() {
                        return Err(Error::NoConnectivity);
                    }
                    return Err(Error::ServerUnavailable);
                }
                Err(e) => return Err(Error::Unknown(e.to_string())),
            }
        }
    }
}

/// Decode a success body, treating an empty body as the empty object so
/// endpoints that return nothing still decode into their response type.
async fn decode_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let text = response
        .text()
        .await
        .map_err(|e| Error::DecodingFailure(e.to_string()))?;
    let text = if text.trim().is_empty() { "{}" } else { &text };
    serde_json::from_str(text).map_err(|e| Error::DecodingFailure(e.to_string()))
}
