//! Application configuration

use crate::executor::MediaFormat;
use crate::utils::error::QueueError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dequeue wait used by workers between stop-flag checks
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Download location
    pub download_location: PathBuf,

    /// Number of worker threads
    pub max_workers: usize,

    /// How long an idle worker waits for a job before re-checking for shutdown
    pub poll_interval_ms: u64,

    /// Format used when the caller does not pick one
    pub default_format: MediaFormat,

    /// Maximum video height used when the caller does not pick one
    pub default_resolution: Option<u32>,

    /// Explicit yt-dlp binary; searched for when absent
    pub ytdlp_path: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_location: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("./downloads"))
                .join("vidqueue"),
            max_workers: 3,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            default_format: MediaFormat::Mp4,
            default_resolution: None,
            ytdlp_path: None,
        }
    }
}

impl AppSettings {
    /// `settings.json` under the platform config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vidqueue")
            .join("settings.json")
    }

    /// Load settings from `path`, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self, QueueError> {
        if !path.exists() {
            tracing::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = fs::read_to_string(path)?;
        let settings: AppSettings = serde_json::from_str(&data)?;
        Ok(settings.normalized())
    }

    pub fn save(&self, path: &Path) -> Result<(), QueueError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Enforce sane minimums
    pub fn normalized(mut self) -> Self {
        self.max_workers = self.max_workers.max(1);
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_workers: self.max_workers.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS)),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_workers: usize,
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        AppSettings::default().queue_config()
    }
}
