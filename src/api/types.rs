//! Wire types for the backend REST contract.
//!
//! The backend owns feed parsing, content extraction, summarization, and
//! storage; this client only relies on the response shapes below. All
//! payloads are camelCase JSON. Timestamps arrive as RFC 3339 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Feeds
// ============================================================================

/// Server-reported feed health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedHealth {
    Healthy,
    Stale,
    Error,
    NeverFetched,
}

/// A subscribed feed as reported by `GET /feeds`.
///
/// The full feed list is replaced wholesale on every successful fetch;
/// the unread count is server-computed and never adjusted locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub unread_count: i64,
    #[serde(default)]
    pub last_fetched: Option<DateTime<Utc>>,
    #[serde(rename = "healthStatus")]
    pub health: FeedHealth,
}

// ============================================================================
// Articles
// ============================================================================

/// An article record from `GET /articles`.
///
/// Reconciliation always keys by the server-assigned `id`; the read and
/// bookmark flags are the only fields mutated locally (optimistically).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub read: bool,
    pub bookmarked: bool,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub has_summary: bool,
}

/// One server-computed group from `GET /articles/grouped`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleGroup {
    pub key: String,
    pub label: String,
    pub articles: Vec<Article>,
}

/// Grouping axis for `GET /articles/grouped?group_by=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Feed,
    Topic,
}

impl GroupBy {
    pub fn as_query(&self) -> &'static str {
        match self {
            GroupBy::Feed => "feed",
            GroupBy::Topic => "topic",
        }
    }
}

// ============================================================================
// Stats and notifications
// ============================================================================

/// Poll target for the refresh cycle (`GET /stats`).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub refresh_in_progress: bool,
    pub total_unread: i64,
}

/// A rule-matched article pending notification, scoped by the server to
/// the most recent refresh (`GET /notifications/pending`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMatch {
    pub id: i64,
    pub article_id: i64,
    pub article_title: String,
    pub rule_id: i64,
    pub match_reason: String,
    #[serde(default)]
    pub priority: i32,
}

/// Envelope for pending notification matches.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotifications {
    pub count: usize,
    pub notifications: Vec<NotificationMatch>,
}
