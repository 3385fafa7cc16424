//! Data structures exchanged between the queue and an executor

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default yt-dlp output template
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Callback invoked by an executor for every progress event it emits
pub type ProgressHook = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Container format requested from the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    #[default]
    Mp4,
    Mp3,
}

impl MediaFormat {
    /// Whether this format carries a video stream
    pub fn is_video(&self) -> bool {
        matches!(self, MediaFormat::Mp4)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" | "video" => Ok(MediaFormat::Mp4),
            "mp3" | "audio" => Ok(MediaFormat::Mp3),
            other => Err(format!("unsupported format: {}", other)),
        }
    }
}

/// Options describing how a single download should be performed.
///
/// The queue clones this at submission time and again for every execution,
/// so a caller mutating its own copy after `submit` never affects a job.
#[derive(Clone, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Output container
    #[serde(default)]
    pub format: MediaFormat,

    /// Maximum video height (e.g. 720). Ignored for audio formats.
    #[serde(default)]
    pub resolution: Option<u32>,

    /// Directory the file is written into; executor default when absent
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// yt-dlp style output template
    #[serde(default = "default_output_template")]
    pub output_template: String,

    /// Download every entry of a playlist URL instead of the single video
    #[serde(default)]
    pub playlist: bool,

    /// Executor-specific keys passed through untouched
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,

    /// Hooks supplied by the caller. The queue appends its own hook and
    /// never replaces these.
    #[serde(skip)]
    pub progress_hooks: Vec<ProgressHook>,
}

fn default_output_template() -> String {
    DEFAULT_OUTPUT_TEMPLATE.to_string()
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: MediaFormat::default(),
            resolution: None,
            output_dir: None,
            output_template: default_output_template(),
            playlist: false,
            extra: BTreeMap::new(),
            progress_hooks: Vec::new(),
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("format", &self.format)
            .field("resolution", &self.resolution)
            .field("output_dir", &self.output_dir)
            .field("output_template", &self.output_template)
            .field("playlist", &self.playlist)
            .field("extra", &self.extra)
            .field("progress_hooks", &self.progress_hooks.len())
            .finish()
    }
}

impl DownloadOptions {
    pub fn new(format: MediaFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_playlist(mut self, playlist: bool) -> Self {
        self.playlist = playlist;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn with_progress_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.progress_hooks.push(Arc::new(hook));
        self
    }
}

/// Transfer state reported by an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
        /// bytes per second
        speed: Option<f64>,
        eta: Option<Duration>,
    },
    Finished {
        filename: Option<PathBuf>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// Shorthand for a byte-counter event with a known total
    pub fn downloading(downloaded_bytes: u64, total_bytes: u64) -> Self {
        ProgressEvent::Downloading {
            downloaded_bytes,
            total_bytes: Some(total_bytes),
            total_bytes_estimate: None,
            speed: None,
            eta: None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ProgressEvent::Downloading { .. } => "downloading",
            ProgressEvent::Finished { .. } => "finished",
            ProgressEvent::Error { .. } => "error",
        }
    }

    /// Completion percentage in [0, 100], if the event carries enough data.
    /// The exact total wins over the estimate; a zero total yields `None`.
    pub fn percentage(&self) -> Option<f64> {
        match self {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
                ..
            } => {
                let total = total_bytes
                    .filter(|t| *t > 0)
                    .or(total_bytes_estimate.filter(|t| *t > 0))?;
                let pct = (*downloaded_bytes as f64 / total as f64) * 100.0;
                Some(pct.clamp(0.0, 100.0))
            }
            _ => None,
        }
    }
}

/// What an executor reports back after a successful run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub output_path: Option<PathBuf>,
}

impl ExecutionOutcome {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: Some(path.into()),
        }
    }
}
