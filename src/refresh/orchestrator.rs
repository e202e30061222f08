//! One end-to-end synchronization cycle.
//!
//! A cycle triggers the backend's asynchronous refresh, polls its progress
//! flag with a hard attempt cap, reconciles the local store progressively
//! while the backend works, and always finishes with one terminal
//! reconciliation, so convergence never depends on the progress flag
//! behaving. Exactly one cycle runs at a time; overlapping triggers are
//! dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::api::ApiClient;
use crate::notify::NotificationBridge;
use crate::preferences::SharedPreferences;
use crate::refresh::CycleState;
use crate::store::SharedStore;

/// Hard cap on poll attempts. Bounds worst-case cycle latency even if the
/// backend never clears its progress flag.
const MAX_POLL_ATTEMPTS: u32 = 60;

/// Sleep between poll attempts.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Reconcile mid-cycle every this many poll attempts, so newly arrived
/// articles become visible during a long multi-feed refresh instead of
/// only at the end.
const PROGRESSIVE_EVERY: u32 = 5;

// ============================================================================
// CycleOutcome
// ============================================================================

/// Result of one orchestrator execution.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// False when the cycle was coalesced into a no-op because another
    /// cycle was already in flight.
    pub ran: bool,
    /// New unread articles observed across the cycle (may be zero).
    pub new_unread: i64,
    /// Reconciliation calls that failed without aborting the cycle.
    pub soft_errors: Vec<String>,
    /// Set when the refresh trigger itself failed.
    pub failed: Option<String>,
}

impl CycleOutcome {
    fn skipped() -> Self {
        Self::default()
    }
}

/// Releases the single-flight slot when dropped, so a cycle future that is
/// cancelled at a suspension point (its task aborted mid-await) cannot leak
/// the guard and block every subsequent cycle.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// RefreshOrchestrator
// ============================================================================

/// Drives one synchronization cycle end-to-end (trigger, poll, reconcile,
/// delta, notify). Constructed once and shared; the atomic guard makes
/// concurrent invocations coalesce.
pub struct RefreshOrchestrator {
    api: ApiClient,
    store: SharedStore,
    bridge: NotificationBridge,
    prefs: SharedPreferences,
    in_flight: AtomicBool,
    poll_interval: Duration,
}

impl RefreshOrchestrator {
    pub fn new(
        api: ApiClient,
        store: SharedStore,
        bridge: NotificationBridge,
        prefs: SharedPreferences,
    ) -> Self {
        Self {
            api,
            store,
            bridge,
            prefs,
            in_flight: AtomicBool::new(false),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll sleep. Production uses the default; tests shrink
    /// it so a full 60-attempt loop finishes quickly.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Execute one synchronization cycle.
    ///
    /// Returns immediately with `ran = false` if a cycle is already in
    /// flight. Otherwise runs to one of the terminal reconciliation points
    /// regardless of trigger or poll failures.
    pub async fn run_cycle(&self) -> CycleOutcome {
        // Single-flight guard: a second trigger while one cycle is running
        // is silently dropped, not queued.
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Refresh cycle already in flight, coalescing trigger");
            return CycleOutcome::skipped();
        }

        let _guard = InFlightGuard(&self.in_flight);
        self.run_cycle_inner().await
    }

    async fn run_cycle_inner(&self) -> CycleOutcome {
        let mut outcome = CycleOutcome {
            ran: true,
            ..Default::default()
        };

        let previous_unread = {
            let store = self.store.lock().await;
            store.total_unread()
        };

        // Fire-and-continue: the backend performs the actual multi-feed
        // fetch asynchronously; we only need the acknowledgment.
        self.store
            .lock()
            .await
            .set_cycle_state(CycleState::Triggering);
        let triggered = match self.api.trigger_refresh().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Refresh trigger failed");
                outcome.failed = Some(e.to_string());
                false
            }
        };

        // Poll loop: bounded liveness guard against a stuck or slow
        // backend. Exhausting the cap is an expected worst case, not an
        // error: the terminal reconciliation below guarantees convergence.
        if triggered {
            self.store.lock().await.set_cycle_state(CycleState::Polling);
            for attempt in 1..=MAX_POLL_ATTEMPTS {
                match self.api.stats().await {
                    Ok(stats) if !stats.refresh_in_progress => {
                        tracing::debug!(attempt, "Backend refresh completed");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Stats poll failed");
                        outcome.soft_errors.push(e.to_string());
                    }
                }

                if attempt % PROGRESSIVE_EVERY == 0 {
                    self.reconcile(&mut outcome.soft_errors).await;
                }

                if attempt < MAX_POLL_ATTEMPTS {
                    tokio::time::sleep(self.poll_interval).await;
                } else {
                    tracing::info!(
                        attempts = MAX_POLL_ATTEMPTS,
                        "Poll cap reached without completion signal, proceeding to terminal reconciliation"
                    );
                }
            }
        }

        // Terminal reconciliation: runs on every exit path, including a
        // failed trigger, as best-effort recovery.
        self.store
            .lock()
            .await
            .set_cycle_state(CycleState::Reconciling);
        self.reconcile(&mut outcome.soft_errors).await;

        let current_unread = {
            let store = self.store.lock().await;
            store.total_unread()
        };
        outcome.new_unread = current_unread - previous_unread;

        if outcome.new_unread > 0 {
            self.bridge.dispatch_for_cycle(outcome.new_unread).await;
        }

        // Anchor the scheduler's next fire even after a failed cycle so a
        // flaky backend cannot produce a retry storm.
        if let Err(e) = self.prefs.lock().await.set_last_refresh(Utc::now()) {
            tracing::warn!(error = %e, "Failed to persist last refresh timestamp");
        }

        {
            let mut store = self.store.lock().await;
            match &outcome.failed {
                Some(reason) => {
                    store.set_status(format!("last refresh failed: {}", reason));
                    store.set_cycle_state(CycleState::Failed(reason.clone()));
                }
                None => {
                    // A transient failure string from an earlier cycle
                    // self-clears on the next success.
                    store.clear_status();
                    store.set_cycle_state(CycleState::Done);
                }
            }
        }

        tracing::info!(
            new_unread = outcome.new_unread,
            soft_errors = outcome.soft_errors.len(),
            failed = outcome.failed.is_some(),
            "Refresh cycle finished"
        );
        outcome
    }

    /// Re-fetch feeds and the articles for the active filter concurrently,
    /// merging server truth into the store. Each call failing is a soft
    /// error; the cycle carries on either way.
    async fn reconcile(&self, soft_errors: &mut Vec<String>) {
        let filter = {
            let store = self.store.lock().await;
            store.filter()
        };
        let (feeds, articles) = futures::join!(self.api.feeds(), self.api.articles(filter));

        match feeds {
            Ok(feeds) => {
                self.store.lock().await.replace_feeds(feeds);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Feed reconciliation failed");
                soft_errors.push(e.to_string());
            }
        }
        match articles {
            Ok(articles) => {
                self.store.lock().await.merge_articles(articles);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Article reconciliation failed");
                soft_errors.push(e.to_string());
            }
        }
    }
}

impl super::scheduler::CycleRunner for RefreshOrchestrator {
    async fn run_cycle(&self) -> CycleOutcome {
        RefreshOrchestrator::run_cycle(self).await
    }
}
