use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Thresholds and endpoints for one tracker. Every field has a default, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base URL of the engagement aggregator, without a trailing slash.
    pub endpoint: String,
    pub log_read_path: String,
    /// Delay before the forced `started` sync after mount.
    pub start_delay_ms: u64,
    pub periodic_interval_secs: u64,
    /// Minimum spacing between non-forced syncs.
    pub min_sync_spacing_secs: u64,
    /// Scroll progress (percentage points) since the last sync that warrants a sync.
    pub scroll_sync_delta_pct: f64,
    pub scroll_sync_min_interval_secs: u64,
    pub frame_interval_ms: u64,
    pub activity_tick_ms: u64,
    /// Gaps between activity ticks at or above this are treated as sleep, not reading.
    pub max_tick_gap_ms: u64,
    pub recovery_window_secs: u64,
    /// Active time needed for a termination report to count as `completed`.
    pub minimum_read_secs: u64,
    pub request_timeout_ms: u64,
    pub final_flush_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".into(),
            log_read_path: "/log_read".into(),
            start_delay_ms: 500,
            periodic_interval_secs: 30,
            min_sync_spacing_secs: 5,
            scroll_sync_delta_pct: 20.0,
            scroll_sync_min_interval_secs: 10,
            frame_interval_ms: 16,
            activity_tick_ms: 1000,
            max_tick_gap_ms: 5000,
            recovery_window_secs: 120,
            minimum_read_secs: 10,
            request_timeout_ms: 10_000,
            final_flush_timeout_ms: 2000,
        }
    }
}

impl TrackerConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read tracker config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid tracker config in {}", path.display()))
    }

    /// Applies `READTRACK_ENDPOINT` and `READTRACK_DEBUG` on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("READTRACK_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().trim_end_matches('/').to_string();
            }
        }

        let debug_mode = std::env::var("READTRACK_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.periodic_interval_secs = 5;
        }

        self
    }

    pub fn log_read_url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.log_read_path.trim_start_matches('/')
        )
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn periodic_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_interval_secs.max(1))
    }

    pub fn min_sync_spacing(&self) -> Duration {
        Duration::from_secs(self.min_sync_spacing_secs)
    }

    pub fn scroll_sync_min_interval(&self) -> Duration {
        Duration::from_secs(self.scroll_sync_min_interval_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn activity_tick(&self) -> Duration {
        Duration::from_millis(self.activity_tick_ms.max(1))
    }

    pub fn max_tick_gap(&self) -> Duration {
        Duration::from_millis(self.max_tick_gap_ms)
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_window_secs)
    }

    pub fn minimum_read(&self) -> Duration {
        Duration::from_secs(self.minimum_read_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn final_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.final_flush_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readtrack.json");
        fs::write(&path, r#"{ "periodic_interval_secs": 60, "endpoint": "https://api.example.com" }"#)
            .unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.periodic_interval(), Duration::from_secs(60));
        assert_eq!(config.log_read_url(), "https://api.example.com/log_read");
        assert_eq!(config.recovery_window(), Duration::from_secs(120));
        assert_eq!(config.minimum_read(), Duration::from_secs(10));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readtrack.json");
        fs::write(&path, "{ not json").unwrap();

        let err = TrackerConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid tracker config"));
    }
}
