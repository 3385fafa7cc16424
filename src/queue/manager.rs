//! Download queue manager with concurrent download support

use crate::executor::{DownloadOptions, Executor};
use crate::queue::events::{EventDispatcher, NoopObserver, QueueObserver};
use crate::queue::task::{DownloadTask, QueueInfo};
use crate::queue::worker::{Shared, WorkerPool};
use crate::utils::config::QueueConfig;
use crate::utils::error::QueueError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Download queue manager with concurrent download support.
///
/// Jobs are executed by a fixed pool of worker threads that is started on
/// the first submission. Every query returns a copy of the task state.
pub struct QueueManager {
    shared: Arc<Shared>,
    pool: WorkerPool,
}

/// Configures a [`QueueManager`] before any worker exists
pub struct QueueManagerBuilder {
    executor: Arc<dyn Executor>,
    config: QueueConfig,
    observer: Arc<dyn QueueObserver>,
}

impl QueueManagerBuilder {
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers.max(1);
        self
    }

    /// How long an idle worker waits for a job before re-checking the stop flag
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(self, observer: impl QueueObserver + 'static) -> Self {
        self.shared_observer(Arc::new(observer))
    }

    /// Like [`observer`](Self::observer) for an observer the caller keeps a handle to
    pub fn shared_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> QueueManager {
        let shared = Arc::new(Shared::new(
            self.executor,
            EventDispatcher::new(self.observer),
            self.config.poll_interval,
        ));
        let pool = WorkerPool::new(Arc::clone(&shared), self.config.max_workers);
        QueueManager { shared, pool }
    }
}

impl QueueManager {
    /// Create new queue manager with default polling and no observer
    pub fn new(executor: impl Executor + 'static, max_workers: usize) -> Self {
        Self::builder(executor).max_workers(max_workers).build()
    }

    pub fn builder(executor: impl Executor + 'static) -> QueueManagerBuilder {
        Self::builder_shared(Arc::new(executor))
    }

    pub fn builder_shared(executor: Arc<dyn Executor>) -> QueueManagerBuilder {
        QueueManagerBuilder {
            executor,
            config: QueueConfig::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Add a download to the queue and return its id.
    ///
    /// Invalid URLs and unusable destinations are rejected here rather than
    /// queued. Never waits for the download itself.
    pub fn submit(&self, url: &str, options: &DownloadOptions) -> Result<String, QueueError> {
        let url = validate_url(url)?;
        if let Some(dir) = &options.output_dir {
            ensure_writable_dir(dir)?;
        }

        let task_id = {
            let mut registry = self.shared.lock();
            let task = registry.insert(url, options.clone());
            // Enqueue under the lock so queue order matches registration order
            self.shared.queue.push(task.id.clone());
            task.id
        };

        info!("Added task {} to queue: {}", task_id, url);
        debug!("{} task(s) waiting for a worker", self.shared.queue.len());

        // Start processing if not already running
        if !self.shared.is_running() {
            self.pool.start();
        }

        Ok(task_id)
    }

    /// Cancel a task that hasn't started yet.
    ///
    /// Returns false for running, finished and unknown tasks; a download in
    /// progress always runs to completion or failure.
    pub fn cancel(&self, task_id: &str) -> bool {
        let cancelled = self.shared.lock().cancel(task_id);
        if cancelled {
            self.shared.notify_settled();
            info!("Cancelled queued task {}", task_id);
        } else {
            debug!("Task {} is not pending; cancel refused", task_id);
        }
        cancelled
    }

    /// Point-in-time copy of one task
    pub fn get_status(&self, task_id: &str) -> Option<DownloadTask> {
        self.shared.lock().get(task_id)
    }

    /// Copy of every task in the active registry, finished ones included
    pub fn get_all_tasks(&self) -> HashMap<String, DownloadTask> {
        self.shared.lock().all()
    }

    /// Active tasks in submission order
    pub fn list_tasks(&self) -> Vec<DownloadTask> {
        self.shared.lock().ordered()
    }

    /// Tasks moved out by [`clear_completed`](Self::clear_completed)
    pub fn history(&self) -> Vec<DownloadTask> {
        self.shared.lock().history()
    }

    /// Status counts and the running flag, read together under the registry lock
    pub fn get_queue_info(&self) -> QueueInfo {
        let registry = self.shared.lock();
        registry.info(self.shared.is_running())
    }

    /// Move completed, failed and cancelled tasks into history
    pub fn clear_completed(&self) -> usize {
        let moved = self.shared.lock().clear_completed();
        info!("Cleared {} finished tasks from queue", moved);
        moved
    }

    /// Start processing queue. No-op if already running.
    pub fn start(&self) -> bool {
        self.pool.start()
    }

    /// Stop the workers and wait for them to exit
    pub fn stop(&self) {
        self.pool.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn max_workers(&self) -> usize {
        self.pool.max_workers()
    }

    /// Block until no task is pending or downloading and every completion
    /// callback has returned. Returns false on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_until_idle(timeout)
    }
}

impl Drop for QueueManager {
    fn drop(&mut self) {
        self.pool.stop();
    }
}

fn validate_url(url: &str) -> Result<&str, QueueError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(QueueError::InvalidUrl("empty URL".to_string()));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(QueueError::InvalidUrl(url.to_string()));
    }

    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| QueueError::InvalidUrl(url.to_string()))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if !matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https") || host.is_empty() {
        return Err(QueueError::InvalidUrl(url.to_string()));
    }

    Ok(url)
}

fn ensure_writable_dir(dir: &std::path::Path) -> Result<(), QueueError> {
    let unwritable = |source: io::Error| QueueError::UnwritableDestination {
        path: dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(unwritable)?;
    let metadata = fs::metadata(dir).map_err(unwritable)?;
    if metadata.permissions().readonly() {
        return Err(unwritable(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "directory is read-only",
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionOutcome, JobContext};
    use crate::queue::task::TaskStatus;
    use anyhow::Result;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn instant_executor() -> impl Executor {
        |_job: &JobContext| -> Result<ExecutionOutcome> { Ok(ExecutionOutcome::default()) }
    }

    /// Executor that blocks every job until the test lets it go
    fn gated_executor() -> (impl Executor, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Mutex::new(rx);
        let executor = move |_job: &JobContext| -> Result<ExecutionOutcome> {
            let _ = rx.lock().unwrap().recv();
            Ok(ExecutionOutcome::default())
        };
        (executor, tx)
    }

    fn fast(executor: impl Executor + 'static, workers: usize) -> QueueManager {
        QueueManager::builder(executor)
            .max_workers(workers)
            .poll_interval(Duration::from_millis(20))
            .build()
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(
            validate_url("  https://example.com/watch?v=1 ").unwrap(),
            "https://example.com/watch?v=1"
        );
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("").is_err());
        assert!(validate_url("   ").is_err());
        assert!(validate_url("example.com/video").is_err());
        assert!(validate_url("ftp://example.com/video").is_err());
        assert!(validate_url("https:///path-only").is_err());
        assert!(validate_url("https://exa mple.com").is_err());
    }

    #[test]
    fn test_submit_rejects_bad_url() {
        let qm = fast(instant_executor(), 1);
        let err = qm.submit("not a url", &DownloadOptions::default()).unwrap_err();
        assert!(matches!(err, QueueError::InvalidUrl(_)));
        assert_eq!(qm.get_queue_info().total, 0);
        assert!(!qm.is_running(), "rejected submissions don't start the pool");
    }

    #[test]
    fn test_submit_rejects_unwritable_destination() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();

        let qm = fast(instant_executor(), 1);
        let options = DownloadOptions::default().with_output_dir(file.join("sub"));
        let err = qm.submit("https://example.com/v", &options).unwrap_err();
        assert!(matches!(err, QueueError::UnwritableDestination { .. }));
    }

    #[test]
    fn test_submit_creates_destination() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a").join("b");
        let qm = fast(instant_executor(), 1);
        qm.submit(
            "https://example.com/v",
            &DownloadOptions::default().with_output_dir(&dir),
        )
        .unwrap();
        assert!(dir.is_dir());
        assert!(qm.wait_until_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_submit_starts_pool_lazily() {
        let qm = fast(instant_executor(), 2);
        assert!(!qm.is_running());
        let id = qm.submit("https://example.com/v", &DownloadOptions::default()).unwrap();
        assert!(qm.is_running());
        assert!(qm.wait_until_idle(Duration::from_secs(5)));
        assert_eq!(qm.get_status(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_start_is_idempotent() {
        let qm = fast(instant_executor(), 2);
        assert!(qm.start());
        assert!(!qm.start());
        qm.stop();
        assert!(!qm.is_running());
        qm.stop();
        assert!(qm.start(), "pool can be restarted after a stop");
    }

    #[test]
    fn test_queue_info_tracks_running_flag() {
        let (executor, gate) = gated_executor();
        let qm = fast(executor, 1);
        assert!(!qm.get_queue_info().is_running);

        qm.submit("https://example.com/v", &DownloadOptions::default()).unwrap();
        let info = qm.get_queue_info();
        assert!(info.is_running);
        assert_eq!(info.pending + info.downloading, 1);

        gate.send(()).unwrap();
        assert!(qm.wait_until_idle(Duration::from_secs(5)));
        qm.stop();
        let info = qm.get_queue_info();
        assert!(!info.is_running);
        assert_eq!(info.completed, 1);
    }

    #[test]
    fn test_status_is_a_snapshot() {
        let (executor, release) = gated_executor();
        let qm = fast(executor, 1);
        let id = qm.submit("https://example.com/v", &DownloadOptions::default()).unwrap();

        let mut copy = qm.get_status(&id).unwrap();
        copy.status = TaskStatus::Failed;
        copy.progress = 99.0;
        assert_ne!(qm.get_status(&id).unwrap().status, TaskStatus::Failed);

        release.send(()).unwrap();
        assert!(qm.wait_until_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_unknown_ids() {
        let qm = fast(instant_executor(), 1);
        assert!(qm.get_status("missing").is_none());
        assert!(!qm.cancel("missing"));
    }

    #[test]
    fn test_list_tasks_in_submission_order() {
        let (executor, release) = gated_executor();
        let qm = fast(executor, 1);
        let ids: Vec<String> = (0..4)
            .map(|i| {
                qm.submit(&format!("https://example.com/{}", i), &DownloadOptions::default())
                    .unwrap()
            })
            .collect();

        let listed: Vec<String> = qm.list_tasks().into_iter().map(|t| t.id).collect();
        assert_eq!(listed, ids);
        assert_eq!(qm.get_all_tasks().len(), 4);

        for _ in 0..4 {
            release.send(()).unwrap();
        }
        assert!(qm.wait_until_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_clear_completed_keeps_history() {
        let qm = fast(instant_executor(), 2);
        for i in 0..3 {
            qm.submit(&format!("https://example.com/{}", i), &DownloadOptions::default())
                .unwrap();
        }
        assert!(qm.wait_until_idle(Duration::from_secs(5)));

        assert_eq!(qm.clear_completed(), 3);
        assert_eq!(qm.get_queue_info().total, 0);
        assert_eq!(qm.history().len(), 3);
        assert!(qm
            .history()
            .iter()
            .all(|t| t.status == TaskStatus::Completed));
    }

    #[test]
    fn test_drop_stops_workers() {
        let qm = fast(instant_executor(), 3);
        qm.start();
        drop(qm);
    }
}
