//! Error handling for vidqueue

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for vidqueue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("yt-dlp not found. Please install yt-dlp")]
    YtDlpNotFound,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Destination is not writable: {path}: {source}")]
    UnwritableDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
