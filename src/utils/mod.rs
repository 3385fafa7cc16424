//! Utility modules for error handling, configuration, logging and folder layout

pub mod config;
pub mod error;
pub mod logging;
pub mod organizer;

// Re-export for convenience
pub use config::{AppSettings, QueueConfig};
pub use error::QueueError;
pub use organizer::{sanitize_name, FolderLayout, FolderSummary, PLAYLIST_OUTPUT_TEMPLATE};
