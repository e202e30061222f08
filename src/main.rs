use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use tidings::api::ApiClient;
use tidings::config::Config;
use tidings::notify::{ChannelNotifier, NotificationBridge};
use tidings::preferences::Preferences;
use tidings::refresh::{RefreshInterval, RefreshOrchestrator, RefreshScheduler};
use tidings::store::{StateStore, StoreEvent};

/// Get the config directory path (~/.config/tidings/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("tidings"))
}

#[derive(Parser, Debug)]
#[command(name = "tidings", about = "Synchronizing client for a remote feed backend")]
struct Args {
    /// Backend base URL (overrides the config file)
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Path to the config file (default: ~/.config/tidings/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run one refresh cycle, print the outcome, and exit
    #[arg(long)]
    refresh_now: bool,

    /// Automatic refresh interval (manual, 10m, 30m, 1h, 2h, 4h, 8h);
    /// overrides preferences and config for this run
    #[arg(long, value_name = "INTERVAL")]
    interval: Option<RefreshInterval>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    let config_path = args
        .config
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let prefs = Preferences::load(config_dir.join("preferences.json"));

    // Precedence: CLI flag, then persisted preference, then config default.
    let interval = match args.interval {
        Some(interval) => interval,
        None => match prefs.get("refresh_interval") {
            Some(_) => prefs.refresh_interval(),
            None => config.default_interval(),
        },
    };

    let backend_url = args.backend_url.unwrap_or_else(|| config.backend_url.clone());
    let api = ApiClient::new(&backend_url).context("Failed to build backend client")?;

    let store = StateStore::shared();
    {
        let mut store = store.lock().await;
        store.set_filter(prefs.active_filter());
    }

    let prefs = Arc::new(Mutex::new(prefs));
    let (notifier, mut alert_rx) = ChannelNotifier::new();
    let bridge = NotificationBridge::new(
        api.clone(),
        Arc::new(notifier),
        config.notifications_enabled,
    );
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        api,
        Arc::clone(&store),
        bridge,
        Arc::clone(&prefs),
    ));

    if args.refresh_now {
        let outcome = orchestrator.run_cycle().await;
        let unread = store.lock().await.total_unread();
        match outcome.failed {
            Some(reason) => {
                eprintln!("Refresh failed: {}", reason);
                std::process::exit(1);
            }
            None => {
                println!(
                    "Refresh complete: {} new, {} unread total ({} soft errors)",
                    outcome.new_unread,
                    unread,
                    outcome.soft_errors.len()
                );
                return Ok(());
            }
        }
    }

    let mut scheduler = RefreshScheduler::new(Arc::clone(&orchestrator), Arc::clone(&prefs));
    scheduler.configure(interval).await;

    let mut store_rx = store.lock().await.subscribe();

    // SIGUSR1 stands in for a wake-from-suspend hook, SIGUSR2 for a
    // foreground hook; host integrations send these on the real events.
    #[cfg(unix)]
    let (mut wake, mut foreground) = {
        use tokio::signal::unix::{signal, SignalKind};
        (
            signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?,
            signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?,
        )
    };

    tracing::info!(backend = %backend_url, interval = %interval, "Client running");

    loop {
        #[cfg(unix)]
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = wake.recv() => scheduler.on_wake().await,
            _ = foreground.recv() => scheduler.on_foreground().await,
            event = store_rx.recv() => handle_store_event(event),
            Some(alert) = alert_rx.recv() => {
                println!("[{}] {}", alert.title, alert.body);
            }
        }

        #[cfg(not(unix))]
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = store_rx.recv() => handle_store_event(event),
            Some(alert) = alert_rx.recv() => {
                println!("[{}] {}", alert.title, alert.body);
            }
        }
    }

    tracing::info!("Shutting down");
    Ok(())
}

fn handle_store_event(event: Result<StoreEvent, tokio::sync::broadcast::error::RecvError>) {
    match event {
        Ok(StoreEvent::UnreadChanged(count)) => {
            tracing::info!(unread = count, "Unread badge updated");
        }
        Ok(StoreEvent::CycleStateChanged(state)) => {
            tracing::debug!(?state, "Cycle state changed");
        }
        Ok(_) => {}
        // Lagged observers re-read the store on the next event; the
        // channel staying open is all that matters here.
        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
            tracing::debug!(missed, "Store event stream lagged");
        }
        Err(tokio::sync::broadcast::error::RecvError::Closed) => {}
    }
}
