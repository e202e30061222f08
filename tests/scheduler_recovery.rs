//! Cold-start missed-fire recovery through the public scheduler API.
//!
//! The persisted last-refresh timestamp is the only anchor that survives a
//! process restart; these tests verify that configuring the scheduler on
//! startup recovers a fire missed while the process was not running, and
//! that a fresh timestamp does not cause a spurious immediate cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::Mutex;

/// Advance paused test time by sleeping, so the runtime auto-advances
/// through every intermediate timer deadline and the scheduler's spawned
/// timer and cycle tasks get polled at the instants they are due. A bare
/// `tokio::time::advance` jumps the clock in one leap before those tasks
/// have been polled.
async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

use tidings::preferences::{Preferences, SharedPreferences};
use tidings::refresh::{CycleOutcome, CycleRunner, RefreshInterval, RefreshScheduler};

struct CountingRunner {
    runs: AtomicUsize,
}

impl CountingRunner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl CycleRunner for CountingRunner {
    async fn run_cycle(&self) -> CycleOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        CycleOutcome {
            ran: true,
            ..Default::default()
        }
    }
}

fn prefs_with_last_refresh(age: Option<chrono::Duration>) -> (TempDir, SharedPreferences) {
    let dir = TempDir::new().unwrap();
    let mut prefs = Preferences::load(dir.path().join("preferences.json"));
    if let Some(age) = age {
        prefs.set_last_refresh(Utc::now() - age).unwrap();
    }
    (dir, Arc::new(Mutex::new(prefs)))
}

#[tokio::test(start_paused = true)]
async fn test_stale_timestamp_triggers_one_immediate_cycle() {
    let (_dir, prefs) = prefs_with_last_refresh(Some(chrono::Duration::minutes(45)));
    let runner = CountingRunner::new();
    let mut scheduler = RefreshScheduler::new(runner.clone(), prefs);

    // lastRefresh = T, interval = 30m, startup at T + 45m: due immediately.
    scheduler.configure(RefreshInterval::M30).await;
    advance(Duration::from_millis(10)).await;
    assert_eq!(runner.runs(), 1);

    // The next fire anchors at the recovery cycle, not the stale schedule.
    advance(Duration::from_secs(29 * 60)).await;
    assert_eq!(runner.runs(), 1);
    advance(Duration::from_secs(61)).await;
    assert_eq!(runner.runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missed_fire_scenario_10m_interval_resume_at_12m() {
    // lastRefresh = T, interval = 10m, startup at T + 12m: exactly one
    // immediate cycle, no extra cycle at the originally scheduled T + 20m.
    let (_dir, prefs) = prefs_with_last_refresh(Some(chrono::Duration::minutes(12)));
    let runner = CountingRunner::new();
    let mut scheduler = RefreshScheduler::new(runner.clone(), prefs);

    scheduler.configure(RefreshInterval::M10).await;
    advance(Duration::from_millis(10)).await;
    assert_eq!(runner.runs(), 1);

    // T + 20m falls 8 minutes from now; nothing fires there.
    advance(Duration::from_secs(9 * 60)).await;
    assert_eq!(runner.runs(), 1);

    // The re-armed timer fires one full interval after the recovery cycle.
    advance(Duration::from_secs(60 + 1)).await;
    assert_eq!(runner.runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_timestamp_waits_out_the_remainder() {
    let (_dir, prefs) = prefs_with_last_refresh(Some(chrono::Duration::minutes(5)));
    let runner = CountingRunner::new();
    let mut scheduler = RefreshScheduler::new(runner.clone(), prefs);

    scheduler.configure(RefreshInterval::M30).await;
    advance(Duration::from_secs(60)).await;
    assert_eq!(runner.runs(), 0);

    // First fire lands 25 minutes after startup.
    advance(Duration::from_secs(24 * 60 + 1)).await;
    assert_eq!(runner.runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_refreshed_fires_immediately() {
    let (_dir, prefs) = prefs_with_last_refresh(None);
    let runner = CountingRunner::new();
    let mut scheduler = RefreshScheduler::new(runner.clone(), prefs);

    scheduler.configure(RefreshInterval::H1).await;
    advance(Duration::from_millis(10)).await;
    assert_eq!(runner.runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wake_with_nothing_due_is_noop() {
    let (_dir, prefs) = prefs_with_last_refresh(Some(chrono::Duration::minutes(2)));
    let runner = CountingRunner::new();
    let mut scheduler = RefreshScheduler::new(runner.clone(), prefs);

    scheduler.configure(RefreshInterval::M30).await;
    advance(Duration::from_secs(60)).await;
    scheduler.on_wake().await;
    scheduler.on_foreground().await;
    assert_eq!(runner.runs(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_interval_ignores_recovery_hooks() {
    let (_dir, prefs) = prefs_with_last_refresh(Some(chrono::Duration::hours(8)));
    let runner = CountingRunner::new();
    let mut scheduler = RefreshScheduler::new(runner.clone(), prefs);

    scheduler.configure(RefreshInterval::Manual).await;
    advance(Duration::from_secs(60 * 60)).await;
    scheduler.on_wake().await;
    assert_eq!(runner.runs(), 0);

    // Manual still allows explicit triggers.
    let outcome = scheduler.force_now().await;
    assert!(outcome.ran);
    assert_eq!(runner.runs(), 1);
}
