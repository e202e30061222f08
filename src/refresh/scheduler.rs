//! Background refresh scheduler.
//!
//! Decides *when* an automatic cycle runs. OS timers do not fire while a
//! process is suspended, so beyond the periodic timer the scheduler keeps
//! a recovery path: wake and foreground signals check whether a fire was
//! missed and, if so, run one immediate cycle and re-arm from now.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::preferences::SharedPreferences;
use crate::refresh::{CycleOutcome, RefreshInterval};

/// Anything the scheduler can ask to run one synchronization cycle.
///
/// The production runner is the refresh orchestrator; tests substitute a
/// counting fake. Implementations own the single-flight guard; a runner
/// asked to run while already running reports `ran = false`.
pub trait CycleRunner: Send + Sync + 'static {
    fn run_cycle(&self) -> impl Future<Output = CycleOutcome> + Send;
}

// ============================================================================
// RefreshScheduler
// ============================================================================

/// Timer state machine: `Idle ⇄ Scheduled → Firing → Idle`.
///
/// `configure` always leaves exactly one armed timer or none. After every
/// cycle, success or failure, the next fire is anchored at `now`, so a
/// failing backend never produces a retry storm.
pub struct RefreshScheduler<R: CycleRunner> {
    runner: Arc<R>,
    prefs: SharedPreferences,
    interval: RefreshInterval,
    /// When the most recent cycle ran, in-session. `None` until the first
    /// fire; cold-start recovery then falls back to the persisted
    /// wall-clock timestamp.
    last_fire: Arc<Mutex<Option<Instant>>>,
    timer: Option<JoinHandle<()>>,
}

impl<R: CycleRunner> RefreshScheduler<R> {
    pub fn new(runner: Arc<R>, prefs: SharedPreferences) -> Self {
        Self {
            runner,
            prefs,
            interval: RefreshInterval::Manual,
            last_fire: Arc::new(Mutex::new(None)),
            timer: None,
        }
    }

    pub fn interval(&self) -> RefreshInterval {
        self.interval
    }

    /// Configure the automatic refresh interval. Idempotent: any pending
    /// timer is invalidated and replaced (or removed for `Manual`). The
    /// first fire is `max(now, last_refresh + interval)`: a persisted
    /// timestamp already older than the interval fires immediately, which
    /// is how a cold start recovers a fire missed while not running.
    pub async fn configure(&mut self, interval: RefreshInterval) {
        self.interval = interval;
        if let Err(e) = self.prefs.lock().await.set_refresh_interval(interval) {
            tracing::warn!(error = %e, "Failed to persist refresh interval");
        }

        self.disarm();
        let Some(period) = interval.duration() else {
            tracing::info!("Automatic refresh disabled");
            return;
        };

        let first_delay = self.delay_until_due(period).await;
        tracing::info!(
            interval = %interval,
            first_fire_in_secs = first_delay.as_secs(),
            "Scheduled automatic refresh"
        );
        self.arm(first_delay, period);
    }

    /// Trigger an immediate cycle. A cycle already in flight makes this a
    /// no-op (the runner's guard coalesces it); the armed timer is left
    /// untouched.
    pub async fn force_now(&self) -> CycleOutcome {
        let outcome = self.runner.run_cycle().await;
        if outcome.ran {
            *self.last_fire.lock().await = Some(Instant::now());
        }
        outcome
    }

    /// Recovery hook: system resumed from suspension.
    pub async fn on_wake(&mut self) {
        self.recover("wake").await;
    }

    /// Recovery hook: application regained foreground focus.
    pub async fn on_foreground(&mut self) {
        self.recover("foreground").await;
    }

    /// If `last_refresh + interval` is already in the past, run one
    /// immediate cycle and re-arm from now. The runner's single-flight
    /// guard prevents double-firing when a scheduled tick races this; the
    /// re-arm replaces the stale timer so the originally scheduled instant
    /// produces no additional cycle.
    async fn recover(&mut self, source: &'static str) {
        let Some(period) = self.interval.duration() else {
            return;
        };
        if !self.delay_until_due(period).await.is_zero() {
            tracing::debug!(source, "No missed fire, keeping existing timer");
            return;
        }

        tracing::info!(source, "Missed scheduled refresh, triggering immediate cycle");
        let outcome = self.runner.run_cycle().await;
        if outcome.ran {
            *self.last_fire.lock().await = Some(Instant::now());
        }
        self.disarm();
        self.arm(period, period);
    }

    /// Time remaining until the next fire is due, zero when overdue.
    /// Prefers the in-session monotonic anchor; falls back to the
    /// persisted wall-clock timestamp on cold start.
    async fn delay_until_due(&self, period: Duration) -> Duration {
        if let Some(at) = *self.last_fire.lock().await {
            return (at + period).saturating_duration_since(Instant::now());
        }

        match self.prefs.lock().await.last_refresh() {
            Some(last) => {
                let due_at = last + chrono::Duration::from_std(period).unwrap_or_default();
                (due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
            }
            // Never refreshed: due immediately.
            None => Duration::ZERO,
        }
    }

    fn arm(&mut self, first_delay: Duration, period: Duration) {
        let runner = Arc::clone(&self.runner);
        let last_fire = Arc::clone(&self.last_fire);

        let handle = tokio::spawn(async move {
            let mut next = Instant::now() + first_delay;
            loop {
                tokio::time::sleep_until(next).await;
                tracing::debug!("Refresh timer fired");

                // Run the cycle in its own task: disarming the timer must
                // only cancel the wait, never a cycle already in flight. A
                // started cycle always reaches its terminal reconciliation.
                let cycle = tokio::spawn({
                    let runner = Arc::clone(&runner);
                    let last_fire = Arc::clone(&last_fire);
                    async move {
                        let outcome = runner.run_cycle().await;
                        if outcome.ran {
                            *last_fire.lock().await = Some(Instant::now());
                        }
                    }
                });
                // Panics in the runner surface as a logged gap, not a crash.
                if let Err(e) = cycle.await {
                    tracing::warn!(error = %e, "Refresh cycle task failed");
                }

                // Re-arm from now regardless of outcome.
                next = Instant::now() + period;
            }
        });
        self.timer = Some(handle);
    }

    /// Cancel the pending timer. A cycle the timer already started keeps
    /// running in its own task and finishes normally.
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<R: CycleRunner> Drop for RefreshScheduler<R> {
    fn drop(&mut self) {
        self.disarm();
    }
}
