//! Local state store: the session-authoritative copy of server-owned state.
//!
//! The store is the only shared mutable resource in the client. All
//! components read and write it through a single `tokio::sync::Mutex`
//! owner, which serializes user mutations (mark-read, bookmark) against
//! reconciliation merges from a running refresh cycle. Observers subscribe
//! to a broadcast channel of [`StoreEvent`]s rather than polling.

mod snapshot;

pub use snapshot::UnreadSnapshot;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};

use crate::api::{Article, Feed};
use crate::filter::{Filter, Section};
use crate::refresh::CycleState;

/// Shared handle to the serialized store owner.
pub type SharedStore = Arc<Mutex<StateStore>>;

/// Broadcast capacity for store change events. Observers that fall behind
/// miss events and re-read the store, so a small buffer is enough.
const EVENT_CAPACITY: usize = 32;

// ============================================================================
// Events and pending writes
// ============================================================================

/// Change notifications for badge/UI observers.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    FeedsReplaced,
    ArticlesChanged,
    /// Total unread count after a feeds replacement.
    UnreadChanged(i64),
    CycleStateChanged(CycleState),
    StatusChanged,
}

/// Which optimistic flag an in-flight mutation owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Read,
    Bookmark,
}

// ============================================================================
// StateStore
// ============================================================================

/// In-memory authoritative-for-the-session copy of feeds and articles,
/// plus view state (filter, section, search) and the unread snapshot.
pub struct StateStore {
    feeds: Vec<Feed>,
    articles: Vec<Article>,

    filter: Filter,
    section: Section,
    search: Option<String>,
    hide_read: bool,

    /// Present only while the unread filter is active in the Home section.
    unread_snapshot: Option<UnreadSnapshot>,
    /// True once the first successful article load has been merged. Used to
    /// trigger the implicit snapshot capture on cold-start-into-unread.
    loaded_once: bool,

    /// Optimistic mutations whose server requests are still in flight.
    /// Reconciliation must not overwrite these flags with stale server data.
    pending_writes: HashSet<(i64, WriteKind)>,

    cycle_state: CycleState,
    /// Transient user-visible failure string ("last refresh failed").
    /// Self-clears on the next successful cycle.
    status_message: Option<String>,

    events: broadcast::Sender<StoreEvent>,
}

impl StateStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            feeds: Vec::new(),
            articles: Vec::new(),
            filter: Filter::default(),
            section: Section::default(),
            search: None,
            hide_read: false,
            unread_snapshot: None,
            loaded_once: false,
            pending_writes: HashSet::new(),
            cycle_state: CycleState::Idle,
            status_message: None,
            events,
        }
    }

    /// Wrap a fresh store in its shared serialized owner.
    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Subscribe to change events. Lagging receivers should re-read the
    /// store instead of relying on a complete event history.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Replace the feed list wholesale with server truth.
    pub fn replace_feeds(&mut self, feeds: Vec<Feed>) {
        self.feeds = feeds;
        let unread = self.total_unread();
        self.emit(StoreEvent::FeedsReplaced);
        self.emit(StoreEvent::UnreadChanged(unread));
    }

    /// Merge freshly fetched articles into the store, keyed by server id.
    ///
    /// Server truth wins for every field except flags owned by a pending
    /// local write, which keep their optimistic value until the request
    /// completes. Articles absent from the server response are dropped,
    /// with one exception: ids held by an active unread snapshot are
    /// retained so the frozen view cannot lose members mid-session (the
    /// backend's unread-filtered listing stops returning an article the
    /// moment it is marked read).
    pub fn merge_articles(&mut self, fresh: Vec<Article>) {
        let fresh_ids: HashSet<i64> = fresh.iter().map(|a| a.id).collect();

        // Carry over locally retained articles before replacing the list.
        let retained: Vec<Article> = match &self.unread_snapshot {
            Some(snapshot) => self
                .articles
                .iter()
                .filter(|a| snapshot.contains(a.id) && !fresh_ids.contains(&a.id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let mut merged = Vec::with_capacity(fresh.len() + retained.len());
        for mut incoming in fresh {
            if self.pending_writes.contains(&(incoming.id, WriteKind::Read)) {
                if let Some(local) = self.article(incoming.id) {
                    incoming.read = local.read;
                }
            }
            if self
                .pending_writes
                .contains(&(incoming.id, WriteKind::Bookmark))
            {
                if let Some(local) = self.article(incoming.id) {
                    incoming.bookmarked = local.bookmarked;
                }
            }
            merged.push(incoming);
        }
        merged.extend(retained);

        self.articles = merged;
        self.emit(StoreEvent::ArticlesChanged);

        if !self.loaded_once {
            self.loaded_once = true;
            self.on_load_complete();
        }
    }

    /// Implicit snapshot capture: covers starting the app with the unread
    /// filter already active, where no filter-change event will ever fire.
    /// The snapshot only ever exists in the Home section, so a cold start
    /// into another section captures nothing; returning to Home does.
    pub fn on_load_complete(&mut self) {
        if self.section == Section::Home
            && self.filter.is_unread()
            && self.unread_snapshot.is_none()
        {
            self.capture_snapshot();
        }
    }

    // ========================================================================
    // Optimistic mutations
    // ========================================================================

    /// Optimistically flip an article's read flag and register the pending
    /// write. Returns the original value for rollback, or `None` if the
    /// article is unknown. The unread snapshot is deliberately untouched.
    pub fn mark_read(&mut self, article_id: i64, read: bool) -> Option<bool> {
        let article = self.articles.iter_mut().find(|a| a.id == article_id)?;
        let original = article.read;
        article.read = read;
        self.pending_writes.insert((article_id, WriteKind::Read));
        self.emit(StoreEvent::ArticlesChanged);
        Some(original)
    }

    /// Optimistically flip an article's bookmark flag. Same contract as
    /// [`Self::mark_read`].
    pub fn set_bookmark(&mut self, article_id: i64, bookmarked: bool) -> Option<bool> {
        let article = self.articles.iter_mut().find(|a| a.id == article_id)?;
        let original = article.bookmarked;
        article.bookmarked = bookmarked;
        self.pending_writes
            .insert((article_id, WriteKind::Bookmark));
        self.emit(StoreEvent::ArticlesChanged);
        Some(original)
    }

    /// The server confirmed the mutation; its responses now carry the new
    /// value, so reconciliation may own the flag again.
    pub fn complete_write(&mut self, article_id: i64, kind: WriteKind) {
        self.pending_writes.remove(&(article_id, kind));
    }

    /// The mutation request failed: restore the original flag and release
    /// the pending write.
    pub fn rollback_write(&mut self, article_id: i64, kind: WriteKind, original: bool) {
        self.pending_writes.remove(&(article_id, kind));
        if let Some(article) = self.articles.iter_mut().find(|a| a.id == article_id) {
            match kind {
                WriteKind::Read => article.read = original,
                WriteKind::Bookmark => article.bookmarked = original,
            }
            self.emit(StoreEvent::ArticlesChanged);
        }
    }

    // ========================================================================
    // Filter, section, and snapshot lifecycle
    // ========================================================================

    /// Change the active filter. Entering `Unread` captures a snapshot
    /// exactly once per entry; leaving it clears the snapshot. Re-setting
    /// the already-active filter is a no-op.
    pub fn set_filter(&mut self, filter: Filter) {
        if filter == self.filter {
            return;
        }
        let was_unread = self.filter.is_unread();
        self.filter = filter;

        if filter.is_unread() && !was_unread && self.section == Section::Home {
            self.capture_snapshot();
        } else if was_unread && !filter.is_unread() {
            self.clear_snapshot();
        }
        self.emit(StoreEvent::ArticlesChanged);
    }

    /// Change the top-level section. Leaving `Home` clears the snapshot
    /// even though the filter itself is unchanged; returning to `Home`
    /// with the unread filter active captures a fresh one.
    pub fn set_section(&mut self, section: Section) {
        if section == self.section {
            return;
        }
        let left_home = self.section == Section::Home;
        self.section = section;

        if left_home {
            self.clear_snapshot();
        } else if section == Section::Home && self.filter.is_unread() {
            self.capture_snapshot();
        }
    }

    /// Freeze the current unread identifier set.
    pub fn capture_snapshot(&mut self) {
        let snapshot = UnreadSnapshot::capture(&self.articles);
        tracing::debug!(size = snapshot.len(), "Captured unread snapshot");
        self.unread_snapshot = Some(snapshot);
    }

    /// Drop the snapshot; subsequent unread views compute live.
    pub fn clear_snapshot(&mut self) {
        if self.unread_snapshot.take().is_some() {
            tracing::debug!("Cleared unread snapshot");
        }
    }

    /// Explicit leave-view event for a single article (e.g., the user
    /// dismisses it). The only operation that shrinks an active snapshot.
    pub fn leave_view(&mut self, article_id: i64) {
        if let Some(snapshot) = &mut self.unread_snapshot {
            if snapshot.remove(article_id) {
                self.emit(StoreEvent::ArticlesChanged);
            }
        }
    }

    pub fn snapshot(&self) -> Option<&UnreadSnapshot> {
        self.unread_snapshot.as_ref()
    }

    pub fn set_search(&mut self, query: Option<String>) {
        self.search = query.filter(|q| !q.trim().is_empty());
        self.emit(StoreEvent::ArticlesChanged);
    }

    pub fn set_hide_read(&mut self, hide: bool) {
        self.hide_read = hide;
        self.emit(StoreEvent::ArticlesChanged);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn article(&self, article_id: i64) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == article_id)
    }

    /// Sum of server-computed unread counts across all feeds.
    pub fn total_unread(&self) -> i64 {
        self.feeds.iter().map(|f| f.unread_count).sum()
    }

    /// Articles visible under the active filter.
    ///
    /// While an unread snapshot is active the visible set is snapshot
    /// membership intersected with the remaining predicates (search), and
    /// the hide-read toggle is suppressed; the live read flag never
    /// decides visibility in that state.
    pub fn visible_articles(&self) -> Vec<&Article> {
        let snapshot_active = self.filter.is_unread() && self.unread_snapshot.is_some();

        self.articles
            .iter()
            .filter(|a| {
                if snapshot_active {
                    // Snapshot membership replaces the read-flag predicate.
                    self.unread_snapshot
                        .as_ref()
                        .map(|s| s.contains(a.id))
                        .unwrap_or(false)
                } else {
                    let matches_filter = match self.filter {
                        Filter::All => true,
                        Filter::Unread => !a.read,
                        Filter::Today => {
                            let date = a.published.unwrap_or(a.created_at).date_naive();
                            date == Utc::now().date_naive()
                        }
                        Filter::Bookmarked => a.bookmarked,
                        Filter::Summarized => a.has_summary,
                        Filter::Unsummarized => !a.has_summary,
                        Filter::ByFeed(feed_id) => a.feed_id == feed_id,
                    };
                    matches_filter && (!self.hide_read || !a.read)
                }
            })
            .filter(|a| match &self.search {
                Some(query) => a.title.to_lowercase().contains(&query.to_lowercase()),
                None => true,
            })
            .collect()
    }

    // ========================================================================
    // Cycle state and status
    // ========================================================================

    pub fn cycle_state(&self) -> &CycleState {
        &self.cycle_state
    }

    pub fn set_cycle_state(&mut self, state: CycleState) {
        if state != self.cycle_state {
            self.cycle_state = state.clone();
            self.emit(StoreEvent::CycleStateChanged(state));
        }
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.emit(StoreEvent::StatusChanged);
    }

    /// A successful cycle clears any lingering failure string.
    pub fn clear_status(&mut self) {
        if self.status_message.take().is_some() {
            self.emit(StoreEvent::StatusChanged);
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
