//! Lifecycle notifications: the observer interface, its channel adapter, and the dispatcher

use crate::queue::task::DownloadTask;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

/// Receives task lifecycle notifications.
///
/// Every method is called from a worker thread, never while the queue's lock
/// is held. Implementations that must touch UI state should forward the
/// notification to their own thread (see [`ChannelObserver`]).
pub trait QueueObserver: Send + Sync {
    /// Task moved to Downloading
    fn on_started(&self, _task: &DownloadTask) {}

    /// Task progress increased; may fire any number of times per task
    fn on_progress(&self, _task: &DownloadTask) {}

    fn on_completed(&self, _task: &DownloadTask) {}

    fn on_failed(&self, _task: &DownloadTask) {}

    /// A worker finished a task and nothing is pending or downloading any more
    fn on_queue_empty(&self) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl QueueObserver for NoopObserver {}

/// Events that describe changes in the download queue state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// A task started downloading
    TaskStarted {
        task_id: String,
        url: String,
        timestamp: DateTime<Utc>,
    },
    /// A task reported more progress
    TaskProgress {
        task_id: String,
        progress: f64,
        timestamp: DateTime<Utc>,
    },
    /// A task completed successfully
    TaskCompleted {
        task_id: String,
        output_path: Option<PathBuf>,
        timestamp: DateTime<Utc>,
    },
    /// A task failed
    TaskFailed {
        task_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Nothing left to do
    QueueEmpty { timestamp: DateTime<Utc> },
}

impl QueueEvent {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            QueueEvent::TaskStarted { task_id, .. }
            | QueueEvent::TaskProgress { task_id, .. }
            | QueueEvent::TaskCompleted { task_id, .. }
            | QueueEvent::TaskFailed { task_id, .. } => Some(task_id),
            QueueEvent::QueueEmpty { .. } => None,
        }
    }
}

/// Forwards lifecycle callbacks as [`QueueEvent`]s over a channel, so a
/// presentation thread can consume them at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<QueueEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<QueueEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, event: QueueEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

impl QueueObserver for ChannelObserver {
    fn on_started(&self, task: &DownloadTask) {
        self.send(QueueEvent::TaskStarted {
            task_id: task.id.clone(),
            url: task.url.clone(),
            timestamp: Utc::now(),
        });
    }

    fn on_progress(&self, task: &DownloadTask) {
        self.send(QueueEvent::TaskProgress {
            task_id: task.id.clone(),
            progress: task.progress,
            timestamp: Utc::now(),
        });
    }

    fn on_completed(&self, task: &DownloadTask) {
        self.send(QueueEvent::TaskCompleted {
            task_id: task.id.clone(),
            output_path: task.result_location.clone(),
            timestamp: Utc::now(),
        });
    }

    fn on_failed(&self, task: &DownloadTask) {
        self.send(QueueEvent::TaskFailed {
            task_id: task.id.clone(),
            error: task.error.clone().unwrap_or_default(),
            timestamp: Utc::now(),
        });
    }

    fn on_queue_empty(&self) {
        self.send(QueueEvent::QueueEmpty {
            timestamp: Utc::now(),
        });
    }
}

/// Invokes the observer on behalf of the worker pool.
///
/// A panicking observer is logged and otherwise ignored so it can't take a
/// worker thread down with it.
#[derive(Clone)]
pub struct EventDispatcher {
    observer: Arc<dyn QueueObserver>,
}

impl EventDispatcher {
    pub fn new(observer: Arc<dyn QueueObserver>) -> Self {
        Self { observer }
    }

    pub fn started(&self, task: &DownloadTask) {
        self.dispatch("on_started", || self.observer.on_started(task));
    }

    pub fn progress(&self, task: &DownloadTask) {
        self.dispatch("on_progress", || self.observer.on_progress(task));
    }

    pub fn completed(&self, task: &DownloadTask) {
        self.dispatch("on_completed", || self.observer.on_completed(task));
    }

    pub fn failed(&self, task: &DownloadTask) {
        self.dispatch("on_failed", || self.observer.on_failed(task));
    }

    pub fn queue_empty(&self) {
        self.dispatch("on_queue_empty", || self.observer.on_queue_empty());
    }

    fn dispatch(&self, callback: &str, f: impl FnOnce()) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
            error!(
                "Observer callback {} panicked: {}",
                callback,
                panic_message(panic.as_ref())
            );
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(NoopObserver))
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
