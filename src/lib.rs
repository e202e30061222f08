//! Synchronizing client core for a remote feed backend.
//!
//! The backend owns feeds, articles, and notification rules; this crate
//! keeps a session-local mirror of that state and the machinery around it:
//! a refresh orchestrator that triggers and polls the backend's
//! asynchronous refresh, a scheduler with missed-fire recovery, an unread
//! snapshot that keeps just-read articles visible, and a notification
//! bridge that turns each cycle's new-article delta into alerts.

pub mod api;
pub mod config;
pub mod filter;
pub mod notify;
pub mod preferences;
pub mod refresh;
pub mod store;
