//! Download folder layout.
//!
//! ```text
//! <base>/
//!   mp4/videos/            single videos
//!   mp4/playlists/<uploader> - <playlist>/
//!   mp3/...                same split for audio
//!   temp/                  yt-dlp fragments, emptied by `cleanup_temp`
//! ```

use crate::executor::{DownloadOptions, MediaFormat, DEFAULT_OUTPUT_TEMPLATE};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Characters that are unsafe in file names on at least one supported platform
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest name `sanitize_name` returns, in characters
pub const MAX_NAME_LEN: usize = 200;

/// Output template for playlist jobs: one folder per playlist, named after its uploader
pub const PLAYLIST_OUTPUT_TEMPLATE: &str =
    "%(uploader|Unknown)s - %(playlist_title|Unknown Playlist)s/%(title)s.%(ext)s";

const FORMATS: [MediaFormat; 2] = [MediaFormat::Mp4, MediaFormat::Mp3];

/// Standardized folder structure for downloads
#[derive(Debug, Clone)]
pub struct FolderLayout {
    pub base_dir: PathBuf,
    temp_dir: PathBuf,
}

/// Snapshot of the layout for display
#[derive(Debug, Clone, Serialize)]
pub struct FolderSummary {
    pub base_path: PathBuf,
    pub temp_folder: PathBuf,
    pub base_exists: bool,
    pub temp_exists: bool,
    /// Files directly inside every `<format>/videos`
    pub videos_count: usize,
    /// Folders inside every `<format>/playlists`
    pub playlist_folders: usize,
}

impl FolderLayout {
    /// Create the layout, making sure every base folder exists
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let layout = Self {
            temp_dir: base_dir.join("temp"),
            base_dir,
        };

        let mut folders = vec![layout.base_dir.clone(), layout.temp_dir.clone()];
        for format in FORMATS {
            folders.push(layout.videos_dir(format));
            folders.push(layout.playlists_dir(format));
        }
        for dir in &folders {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create folder {}", dir.display()))?;
        }
        info!("Download folders ready under {}", layout.base_dir.display());

        Ok(layout)
    }

    pub fn videos_dir(&self, format: MediaFormat) -> PathBuf {
        self.base_dir.join(format.as_str()).join("videos")
    }

    pub fn playlists_dir(&self, format: MediaFormat) -> PathBuf {
        self.base_dir.join(format.as_str()).join("playlists")
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Where a job with these options should land
    pub fn destination_for(&self, options: &DownloadOptions) -> PathBuf {
        if options.playlist {
            self.playlists_dir(options.format)
        } else {
            self.videos_dir(options.format)
        }
    }

    /// Fill in whatever the caller left unset: destination folder, the
    /// per-playlist template, and yt-dlp's temporary directory.
    pub fn apply(&self, mut options: DownloadOptions) -> DownloadOptions {
        if options.output_dir.is_none() {
            options.output_dir = Some(self.destination_for(&options));
        }
        if options.playlist && options.output_template == DEFAULT_OUTPUT_TEMPLATE {
            options.output_template = PLAYLIST_OUTPUT_TEMPLATE.to_string();
        }
        options.extra.entry("paths".to_string()).or_insert_with(|| {
            serde_json::Value::String(format!("temp:{}", self.temp_dir.display()))
        });
        options
    }

    /// Remove everything inside `temp/`. Returns how many entries went away;
    /// failures are logged and skipped.
    pub fn cleanup_temp(&self) -> usize {
        let entries = match fs::read_dir(&self.temp_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Nothing to clean in {}: {}", self.temp_dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    debug!("Removed temp entry {}", path.display());
                    removed += 1;
                }
                Err(e) => error!("Failed to remove {}: {}", path.display(), e),
            }
        }
        removed
    }

    pub fn summary(&self) -> FolderSummary {
        let count = |dir: PathBuf, dirs: bool| {
            fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .flatten()
                        .filter(|e| e.path().is_dir() == dirs)
                        .count()
                })
                .unwrap_or(0)
        };

        FolderSummary {
            base_path: self.base_dir.clone(),
            temp_folder: self.temp_dir.clone(),
            base_exists: self.base_dir.exists(),
            temp_exists: self.temp_dir.exists(),
            videos_count: FORMATS.iter().map(|f| count(self.videos_dir(*f), false)).sum(),
            playlist_folders: FORMATS.iter().map(|f| count(self.playlists_dir(*f), true)).sum(),
        }
    }
}

/// Make a name safe to use as a single path component
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if RESERVED_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    let capped: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    let capped = capped.trim_end();
    if capped.is_empty() {
        "Unknown".to_string()
    } else {
        capped.to_string()
    }
}
