//! Async HTTP facade over the feed backend.
//!
//! This is the only place the crate talks to the network. The backend does
//! the heavy lifting (fetching, parsing, summarization, storage); the
//! client relies on a narrow set of endpoints and decodes their JSON into
//! the types in [`super::types`].

use std::time::Duration;

use reqwest::redirect::Policy;
use thiserror::Error;

use super::types::{
    Article, ArticleGroup, Feed, GroupBy, PendingNotifications, Stats,
};
use crate::filter::Filter;

/// Per-request timeout. The poll loop has its own attempt cap; this bounds
/// a single hung connection.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum payload prefix included in decode-failure logs.
const DECODE_LOG_PREFIX: usize = 128;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the backend facade.
///
/// All variants are recoverable: callers record them as soft errors or
/// transient status strings and carry on (a failed reconciliation call
/// never aborts the surrounding cycle).
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body was not the expected JSON shape
    #[error("Decode error from {endpoint}: {detail}")]
    Decode { endpoint: &'static str, detail: String },
}

// ============================================================================
// HTTP Client Configuration
// ============================================================================

/// Create a custom redirect policy with loop detection and limited hops.
///
/// - Limits redirects to 3 hops maximum
/// - Detects redirect loops (same URL appearing twice in chain)
/// - Logs redirect chain for debugging
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        // Limit to 3 redirects
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        // Detect loops
        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

// ============================================================================
// ApiClient
// ============================================================================

/// Narrow async client for the backend REST surface.
///
/// The base URL is injectable so tests can point the facade at a wiremock
/// server instead of a real backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a pooled client for the given backend base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { http, base_url })
    }

    /// Full feed list with server-computed unread counts.
    pub async fn feeds(&self) -> Result<Vec<Feed>, ApiError> {
        self.get_json("/feeds", "GET /feeds").await
    }

    /// Article list for the given filter.
    pub async fn articles(&self, filter: Filter) -> Result<Vec<Article>, ApiError> {
        let path = format!("/articles?filter={}", filter.as_query());
        self.get_json(&path, "GET /articles").await
    }

    /// Server-computed grouping of articles by feed or topic.
    pub async fn articles_grouped(
        &self,
        group_by: GroupBy,
        unread_only: bool,
    ) -> Result<Vec<ArticleGroup>, ApiError> {
        let path = format!(
            "/articles/grouped?group_by={}&unread_only={}",
            group_by.as_query(),
            unread_only
        );
        self.get_json(&path, "GET /articles/grouped").await
    }

    /// Trigger an asynchronous remote refresh.
    ///
    /// Fire-and-continue: the backend performs the actual multi-feed fetch
    /// in the background, so only the acknowledgment status matters here.
    pub async fn trigger_refresh(&self) -> Result<(), ApiError> {
        let response = self
            .send(self.http.post(format!("{}/feeds/refresh", self.base_url)))
            .await?;
        Self::check_status(response).map(|_| ())
    }

    /// Poll target: refresh progress flag and total unread count.
    pub async fn stats(&self) -> Result<Stats, ApiError> {
        self.get_json("/stats", "GET /stats").await
    }

    /// Rule matches for the most recent refresh cycle.
    pub async fn pending_notifications(&self) -> Result<PendingNotifications, ApiError> {
        self.get_json("/notifications/pending", "GET /notifications/pending")
            .await
    }

    /// Set an article's read flag.
    pub async fn mark_read(&self, article_id: i64, read: bool) -> Result<(), ApiError> {
        let url = format!("{}/articles/{}/read", self.base_url, article_id);
        let response = self
            .send(self.http.post(url).json(&serde_json::json!({ "read": read })))
            .await?;
        Self::check_status(response).map(|_| ())
    }

    /// Set an article's bookmark flag.
    pub async fn set_bookmark(&self, article_id: i64, bookmarked: bool) -> Result<(), ApiError> {
        let url = format!("{}/articles/{}/bookmark", self.base_url, article_id);
        let response = self
            .send(
                self.http
                    .post(url)
                    .json(&serde_json::json!({ "bookmarked": bookmarked })),
            )
            .await?;
        Self::check_status(response).map(|_| ())
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| ApiError::Timeout)?
            .map_err(ApiError::Network)
    }

    fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }
        Ok(response)
    }

    /// GET a path and decode the JSON body.
    ///
    /// Decode failures log the endpoint and a bounded payload prefix so a
    /// contract drift is diagnosable from logs alone.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        endpoint: &'static str,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = Self::check_status(self.send(self.http.get(url)).await?)?;

        let body = response.text().await.map_err(ApiError::Network)?;
        serde_json::from_str(&body).map_err(|e| {
            let prefix: String = body.chars().take(DECODE_LOG_PREFIX).collect();
            tracing::warn!(
                endpoint = endpoint,
                error = %e,
                payload_prefix = %prefix,
                "Failed to decode backend response"
            );
            ApiError::Decode {
                endpoint,
                detail: e.to_string(),
            }
        })
    }
}
