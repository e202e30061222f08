//! Article list filters.
//!
//! Exactly one filter is active at a time. The active filter is both the
//! query sent to the backend (`GET /articles?filter=...`) and the local
//! predicate used by the state store; switching to or away from `Unread`
//! drives the unread-snapshot lifecycle in `store::snapshot`.

use std::fmt;

/// Closed set of article list filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    All,
    Unread,
    Today,
    Bookmarked,
    Summarized,
    Unsummarized,
    /// Articles belonging to a single feed.
    ByFeed(i64),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All
    }
}

impl Filter {
    /// Query string value for `GET /articles?filter=...`.
    ///
    /// `ByFeed` is expressed as `feed:{id}`, matching the backend's
    /// single-parameter filter contract.
    pub fn as_query(&self) -> String {
        match self {
            Filter::All => "all".to_string(),
            Filter::Unread => "unread".to_string(),
            Filter::Today => "today".to_string(),
            Filter::Bookmarked => "bookmarked".to_string(),
            Filter::Summarized => "summarized".to_string(),
            Filter::Unsummarized => "unsummarized".to_string(),
            Filter::ByFeed(id) => format!("feed:{}", id),
        }
    }

    /// Parse a persisted filter string back into a `Filter`.
    ///
    /// Unknown values return `None` so callers fall back to the default
    /// instead of failing to start.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Filter::All),
            "unread" => Some(Filter::Unread),
            "today" => Some(Filter::Today),
            "bookmarked" => Some(Filter::Bookmarked),
            "summarized" => Some(Filter::Summarized),
            "unsummarized" => Some(Filter::Unsummarized),
            other => other
                .strip_prefix("feed:")
                .and_then(|id| id.parse().ok())
                .map(Filter::ByFeed),
        }
    }

    /// True when this filter's snapshot semantics apply.
    pub fn is_unread(&self) -> bool {
        matches!(self, Filter::Unread)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_query())
    }
}

/// Top-level view context. Leaving `Home` invalidates the unread snapshot
/// even if the filter itself has not changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Home,
    Saved,
    Settings,
}
