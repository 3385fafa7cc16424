//! vidqueue library
//!
//! A bounded pool of worker threads pulling download jobs from a FIFO queue,
//! with lifecycle notifications and a yt-dlp based executor.

pub mod executor;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use executor::{
    DownloadOptions, ExecutionOutcome, Executor, JobContext, MediaFormat, ProgressEvent,
    YtDlpExecutor,
};
pub use queue::{
    ChannelObserver, DownloadTask, QueueEvent, QueueInfo, QueueManager, QueueObserver, TaskStatus,
};
pub use utils::{AppSettings, FolderLayout, QueueError};
