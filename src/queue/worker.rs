//! Fixed-size pool of worker threads pulling tasks from the shared queue

use crate::executor::{ExecutionOutcome, Executor, JobContext, ProgressEvent, ProgressHook};
use crate::queue::events::{panic_message, EventDispatcher};
use crate::queue::fifo::TaskQueue;
use crate::queue::registry::{Claim, Registry};
use crate::queue::task::TaskStatus;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// State shared by the facade and every worker
pub(crate) struct Shared {
    registry: Mutex<Registry>,
    /// Signalled whenever a task reaches a terminal state
    settled: Condvar,
    pub(crate) queue: TaskQueue,
    running: AtomicBool,
    /// Worker threads that haven't retired yet. Retiring and starting both
    /// decide under this lock, so the pool never exceeds its size.
    live_workers: Mutex<usize>,
    executor: Arc<dyn Executor>,
    pub(crate) dispatcher: EventDispatcher,
    poll_interval: Duration,
}

impl Shared {
    pub fn new(
        executor: Arc<dyn Executor>,
        dispatcher: EventDispatcher,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            settled: Condvar::new(),
            queue: TaskQueue::new(),
            running: AtomicBool::new(false),
            live_workers: Mutex::new(0),
            executor,
            dispatcher,
            poll_interval,
        }
    }

    /// Lock the registry. A panic elsewhere never leaves it half-updated
    /// (every mutation is a single method call), so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn notify_settled(&self) {
        self.settled.notify_all();
    }

    /// Block until nothing is Pending or Downloading, or `timeout` elapses
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut registry = self.lock();
        loop {
            if registry.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .settled
                .wait_timeout(registry, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            registry = guard;
        }
    }

    fn live_workers(&self) -> MutexGuard<'_, usize> {
        self.live_workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by a worker between jobs; true means it must exit now
    fn retire_if_stopped(&self) -> bool {
        let mut live = self.live_workers();
        if self.is_running() {
            return false;
        }
        *live = live.saturating_sub(1);
        true
    }

    fn record_progress(&self, task_id: &str, percentage: f64) {
        let snapshot = self.lock().advance(task_id, percentage);
        if let Some(task) = snapshot {
            debug!("Task {} progress {:.1}%", task_id, task.progress);
            self.dispatcher.progress(&task);
        }
    }
}

thread_local! {
    /// Set on pool threads so lifecycle calls made from observer callbacks never wait on themselves
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Worker threads plus the flag that keeps them looping
pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    max_workers: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker_id: AtomicUsize,
}

impl WorkerPool {
    pub fn new(shared: Arc<Shared>, max_workers: usize) -> Self {
        Self {
            shared,
            max_workers: max_workers.max(1),
            handles: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Bring the pool up to `max_workers` live threads. No-op when already running.
    ///
    /// Workers told to stop that are still finishing a job count towards
    /// the limit and simply keep going. From a worker thread this gives up
    /// instead of waiting when another thread is starting or stopping the pool.
    pub fn start(&self) -> bool {
        if self.shared.is_running() {
            return false;
        }
        let Some(mut handles) = self.acquire_handles() else {
            debug!("Worker pool is starting or stopping elsewhere; not starting");
            return false;
        };
        handles.retain(|h| !h.is_finished());

        let (needed, reused) = {
            let mut live = self.shared.live_workers();
            if self.shared.is_running() {
                return false;
            }
            self.shared.running.store(true, Ordering::SeqCst);
            let needed = self.max_workers.saturating_sub(*live);
            let reused = *live;
            *live += needed;
            (needed, reused)
        };

        let mut spawned_count = 0;
        for _ in 0..needed {
            let worker_id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("vidqueue-worker-{}", worker_id))
                .spawn(move || worker_loop(shared, worker_id));
            match spawned {
                Ok(handle) => {
                    handles.push(handle);
                    spawned_count += 1;
                }
                Err(e) => error!("Failed to spawn worker {}: {}", worker_id, e),
            }
        }

        if spawned_count < needed {
            let mut live = self.shared.live_workers();
            *live -= needed - spawned_count;
            if *live == 0 {
                error!("No worker thread could be started");
                self.shared.running.store(false, Ordering::SeqCst);
                return false;
            }
        }

        info!(
            "Started {} download workers ({} still running from before)",
            spawned_count, reused
        );
        true
    }

    /// Clear the running flag, join every worker, then report the queue empty.
    ///
    /// Workers notice the flag on their next poll timeout, so this returns
    /// within roughly one poll interval plus the longest in-flight download.
    /// Called from a worker thread it only clears the flag; the threads are
    /// joined, and `on_queue_empty` fired, by the next `stop` from outside the pool.
    pub fn stop(&self) {
        if ON_WORKER.with(Cell::get) {
            if self.shared.running.swap(false, Ordering::SeqCst) {
                info!("Stop requested from a worker thread");
            }
            return;
        }

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.running.store(false, Ordering::SeqCst);
        if handles.is_empty() {
            return;
        }

        info!("Stopping {} download workers", handles.len());
        for handle in handles.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("Worker {} terminated by panic", name);
            }
        }
        drop(handles);
        info!("Download workers stopped");

        self.shared.dispatcher.queue_empty();
    }

    fn acquire_handles(&self) -> Option<MutexGuard<'_, Vec<JoinHandle<()>>>> {
        if !ON_WORKER.with(Cell::get) {
            return Some(self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        }
        match self.handles.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    ON_WORKER.with(|flag| flag.set(true));
    debug!("Worker {} started", worker_id);

    while !shared.retire_if_stopped() {
        let task_id = match shared.queue.pop_timeout(shared.poll_interval) {
            Some(id) => id,
            None => continue,
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| process_task(&shared, &task_id))) {
            error!(
                "Worker {} hit an internal error on task {}: {}",
                worker_id,
                task_id,
                panic_message(panic.as_ref())
            );
        }
    }

    debug!("Worker {} exiting", worker_id);
}

/// Marks one task's terminal callbacks as delivered, even if dispatch unwinds
struct Settle<'a>(&'a Shared);

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        self.0.lock().dispatch_done();
        self.0.notify_settled();
    }
}

/// Run one dequeued task through Downloading to a terminal state
fn process_task(shared: &Arc<Shared>, task_id: &str) {
    let started = match shared.lock().claim(task_id) {
        Claim::Started(task) => task,
        Claim::Skipped(status) => {
            debug!("Skipping task {} ({})", task_id, status);
            return;
        }
        Claim::Missing => {
            warn!("Dequeued unknown task {}", task_id);
            return;
        }
    };

    info!("Task {} started: {}", task_id, started.url);
    shared.dispatcher.started(&started);

    let reported_location: Arc<Mutex<Option<PathBuf>>> = Arc::new(Mutex::new(None));
    let hook = progress_hook(Arc::downgrade(shared), task_id, Arc::clone(&reported_location));
    let ctx = JobContext::new(task_id, started.url.clone(), started.options.clone(), Some(hook));

    let outcome: Result<ExecutionOutcome, String> =
        match catch_unwind(AssertUnwindSafe(|| shared.executor.execute(&ctx))) {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(panic) => Err(format!(
                "executor panicked: {}",
                panic_message(panic.as_ref())
            )),
        };
    drop(ctx);

    let reported = reported_location
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    let finished = shared.lock().finish(task_id, outcome, reported);
    let Some(finished) = finished else {
        warn!("Task {} was no longer downloading when its executor returned", task_id);
        return;
    };
    // Waiters see the queue idle only after the callbacks below returned
    let _settle = Settle(shared);

    if finished.task.status == TaskStatus::Completed {
        info!("Task {} completed successfully", task_id);
        shared.dispatcher.completed(&finished.task);
    } else {
        error!(
            "Task {} failed: {}",
            task_id,
            finished.task.error.as_deref().unwrap_or("unknown error")
        );
        shared.dispatcher.failed(&finished.task);
    }

    if finished.queue_idle {
        debug!("Queue drained");
        shared.dispatcher.queue_empty();
    }
}

/// The queue's own hook: turns byte counters into task progress and remembers
/// the last finished filename. Holds only a weak reference to the queue.
fn progress_hook(
    shared: Weak<Shared>,
    task_id: &str,
    reported_location: Arc<Mutex<Option<PathBuf>>>,
) -> ProgressHook {
    let task_id = task_id.to_string();
    Arc::new(move |event: &ProgressEvent| {
        if let ProgressEvent::Finished {
            filename: Some(path),
        } = event
        {
            *reported_location
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(path.clone());
        }

        let Some(percentage) = event.percentage() else {
            return;
        };
        if let Some(shared) = shared.upgrade() {
            shared.record_progress(&task_id, percentage);
        }
    })
}
