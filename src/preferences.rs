//! Persisted local key-value state.
//!
//! Everything the backend does not own lives here: the configured refresh
//! interval, the last-refresh timestamp the scheduler anchors on across
//! restarts, the active filter, and UI folding state. Stored as a flat
//! JSON map; every write persists immediately via write-temp-then-rename
//! so the file is never left in a partial state.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::filter::Filter;
use crate::refresh::RefreshInterval;

/// Preferences shared across the run loop, scheduler, and orchestrator.
pub type SharedPreferences = std::sync::Arc<tokio::sync::Mutex<Preferences>>;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Failed to access preferences file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode preferences: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Preferences
// ============================================================================

/// Flat key-value preference store backed by a JSON file.
///
/// Reads are in-memory O(1); writes persist to disk and update the map
/// atomically. A corrupt or unreadable file is logged and replaced with
/// defaults rather than failing startup.
pub struct Preferences {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl Preferences {
    /// Load preferences from `path`. Missing file yields empty defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Corrupt preferences file, starting from defaults"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No preferences file, using defaults");
                HashMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read preferences");
                HashMap::new()
            }
        };
        Self { path, values }
    }

    /// Get a raw preference value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a preference: updates the in-memory map and persists to disk.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PreferencesError> {
        self.values.insert(key.to_string(), value.to_string());
        self.persist()
    }

    // ========================================================================
    // Type-safe Accessors
    // ========================================================================

    /// Configured refresh interval. Unparseable values fall back to manual.
    pub fn refresh_interval(&self) -> RefreshInterval {
        self.get("refresh_interval")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_refresh_interval(
        &mut self,
        interval: RefreshInterval,
    ) -> Result<(), PreferencesError> {
        self.set("refresh_interval", interval.as_str())
    }

    /// Timestamp of the last completed refresh cycle, if any.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.get("last_refresh_timestamp")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn set_last_refresh(&mut self, at: DateTime<Utc>) -> Result<(), PreferencesError> {
        self.set("last_refresh_timestamp", &at.timestamp().to_string())
    }

    /// Persisted active filter, defaulting to `All`.
    pub fn active_filter(&self) -> Filter {
        self.get("active_filter")
            .and_then(Filter::parse)
            .unwrap_or_default()
    }

    pub fn set_active_filter(&mut self, filter: Filter) -> Result<(), PreferencesError> {
        self.set("active_filter", &filter.as_query())
    }

    /// Collapsed section keys for UI folding state.
    pub fn collapsed_sections(&self) -> Vec<String> {
        self.get("collapsed_sections")
            .map(|v| {
                v.split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_collapsed_sections(&mut self, sections: &[String]) -> Result<(), PreferencesError> {
        self.set("collapsed_sections", &sections.join(","))
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn persist(&self) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.values)?;
        atomic_write(&self.path, content.as_bytes())?;
        Ok(())
    }
}

/// Atomically write a file using write-to-temp-then-rename.
/// The destination is never left in a partial state, and the randomized
/// temp name prevents a predictable-path race.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;

    if let Err(e) = temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all())
    {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }
    drop(temp_file);

    std::fs::rename(&temp_path, dst).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_prefs() -> (TempDir, Preferences) {
        let dir = TempDir::new().unwrap();
        let prefs = Preferences::load(dir.path().join("preferences.json"));
        (dir, prefs)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (_dir, prefs) = temp_prefs();
        assert_eq!(prefs.refresh_interval(), RefreshInterval::Manual);
        assert!(prefs.last_refresh().is_none());
        assert_eq!(prefs.active_filter(), Filter::All);
        assert!(prefs.collapsed_sections().is_empty());
    }

    #[test]
    fn test_values_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");

        let mut prefs = Preferences::load(&path);
        prefs.set_refresh_interval(RefreshInterval::M30).unwrap();
        let at = Utc.timestamp_opt(1_750_000_000, 0).unwrap();
        prefs.set_last_refresh(at).unwrap();
        prefs.set_active_filter(Filter::Unread).unwrap();
        drop(prefs);

        let reloaded = Preferences::load(&path);
        assert_eq!(reloaded.refresh_interval(), RefreshInterval::M30);
        assert_eq!(reloaded.last_refresh(), Some(at));
        assert_eq!(reloaded.active_filter(), Filter::Unread);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "not valid json {{").unwrap();

        let prefs = Preferences::load(&path);
        assert_eq!(prefs.refresh_interval(), RefreshInterval::Manual);
    }

    #[test]
    fn test_invalid_interval_string_falls_back_to_manual() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, r#"{"refresh_interval": "45m"}"#).unwrap();

        let prefs = Preferences::load(&path);
        assert_eq!(prefs.refresh_interval(), RefreshInterval::Manual);
    }

    #[test]
    fn test_collapsed_sections_round_trip() {
        let (_dir, mut prefs) = temp_prefs();
        prefs
            .set_collapsed_sections(&["tech".to_string(), "news".to_string()])
            .unwrap();
        assert_eq!(prefs.collapsed_sections(), vec!["tech", "news"]);
    }

    #[test]
    fn test_set_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preferences.json");
        let mut prefs = Preferences::load(&path);
        prefs.set("k", "v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        // No leftover temp files
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
