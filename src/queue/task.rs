//! Download task, its status machine, and aggregate queue counts

use crate::executor::DownloadOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, Failed and Cancelled never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Download task.
///
/// Values handed out by the queue are snapshots; editing one has no effect
/// on the job the workers see.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadTask {
    pub id: String,
    pub url: String,
    pub options: DownloadOptions,
    pub status: TaskStatus,
    /// Percentage in [0, 100]
    pub progress: f64,
    /// Set only when `status` is `Failed`
    pub error: Option<String>,
    /// Set only when `status` is `Completed` and the executor reported a file
    pub result_location: Option<PathBuf>,
    /// Submission order within one queue
    pub sequence: u64,
    pub added_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadTask {
    /// Create a new pending task with a fresh id
    pub fn new(url: impl Into<String>, options: DownloadOptions, sequence: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            options,
            status: TaskStatus::Pending,
            progress: 0.0,
            error: None,
            result_location: None,
            sequence,
            added_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Pending -> Downloading
    pub(crate) fn begin(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Downloading;
        self.started_at = Some(Utc::now());
        true
    }

    /// Downloading -> Completed, progress forced to 100
    pub(crate) fn complete(&mut self, result_location: Option<PathBuf>) -> bool {
        if self.status != TaskStatus::Downloading {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.progress = 100.0;
        self.result_location = result_location;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Downloading -> Failed. Progress keeps its last reported value.
    pub(crate) fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status != TaskStatus::Downloading {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Pending -> Cancelled
    pub(crate) fn cancel(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Raise progress while downloading; never lowers it
    pub(crate) fn advance_progress(&mut self, percentage: f64) -> bool {
        if self.status != TaskStatus::Downloading || !percentage.is_finite() {
            return false;
        }
        let percentage = percentage.clamp(0.0, 100.0);
        if percentage <= self.progress {
            return false;
        }
        self.progress = percentage;
        true
    }
}

/// Aggregate counts over every task in the active registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub pending: usize,
    pub downloading: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
    pub is_running: bool,
}

impl QueueInfo {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a DownloadTask>, is_running: bool) -> Self {
        let mut info = QueueInfo {
            is_running,
            ..Default::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => info.pending += 1,
                TaskStatus::Downloading => info.downloading += 1,
                TaskStatus::Completed => info.completed += 1,
                TaskStatus::Failed => info.failed += 1,
                TaskStatus::Cancelled => info.cancelled += 1,
            }
            info.total += 1;
        }
        info
    }

    /// No job waiting or in flight. Counts only: a worker may still be
    /// running the last terminal callback, which
    /// [`QueueManager::wait_until_idle`](crate::queue::QueueManager::wait_until_idle) waits for.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.downloading == 0
    }
}
