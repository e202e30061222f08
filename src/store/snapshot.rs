//! Frozen identifier set that stabilizes the unread view.
//!
//! Marking an article read while the unread filter is active must not make
//! it vanish from the visible list. The snapshot records which article ids
//! satisfied "unread" at the moment the view was entered; visibility is
//! then decided by snapshot membership, never by the live read flag.
//!
//! Invariant: once captured, the set only shrinks, and only through
//! explicit leave-view events. Read-state mutations never touch it.

use std::collections::HashSet;

use crate::api::Article;

/// The set of article ids visible under the unread filter for the current
/// view entry. Created on entry to the unread view, destroyed on exit.
#[derive(Debug, Clone)]
pub struct UnreadSnapshot {
    ids: HashSet<i64>,
}

impl UnreadSnapshot {
    /// Record the ids of all currently unread articles.
    pub fn capture(articles: &[Article]) -> Self {
        let ids = articles.iter().filter(|a| !a.read).map(|a| a.id).collect();
        Self { ids }
    }

    pub fn contains(&self, article_id: i64) -> bool {
        self.ids.contains(&article_id)
    }

    /// Explicit leave-view event: the only sanctioned way the set shrinks.
    pub fn remove(&mut self, article_id: i64) -> bool {
        self.ids.remove(&article_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(id: i64, read: bool) -> Article {
        Article {
            id,
            feed_id: 1,
            title: format!("Article {}", id),
            read,
            bookmarked: false,
            published: None,
            created_at: Utc::now(),
            has_summary: false,
        }
    }

    #[test]
    fn test_capture_records_only_unread() {
        let articles = vec![article(1, false), article(2, true), article(3, false)];
        let snapshot = UnreadSnapshot::capture(&articles);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(1));
        assert!(!snapshot.contains(2));
        assert!(snapshot.contains(3));
    }

    #[test]
    fn test_remove_shrinks_set() {
        let articles = vec![article(1, false), article(2, false)];
        let mut snapshot = UnreadSnapshot::capture(&articles);

        assert!(snapshot.remove(1));
        assert!(!snapshot.contains(1));
        assert_eq!(snapshot.len(), 1);

        // Removing an absent id is a no-op
        assert!(!snapshot.remove(99));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_empty_capture() {
        let snapshot = UnreadSnapshot::capture(&[]);
        assert!(snapshot.is_empty());
    }
}
