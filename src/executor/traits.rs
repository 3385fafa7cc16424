use crate::executor::models::{DownloadOptions, ExecutionOutcome, ProgressEvent, ProgressHook};
use anyhow::Result;
use std::fmt;

/// Core trait for anything that can perform a download.
///
/// `execute` blocks until the transfer is over. Returning `Err` marks the job
/// failed; any `Ok` marks it completed. Progress is reported through
/// [`JobContext::report`] as often (or as rarely) as the executor likes.
pub trait Executor: Send + Sync {
    fn execute(&self, job: &JobContext) -> Result<ExecutionOutcome>;
}

impl<F> Executor for F
where
    F: Fn(&JobContext) -> Result<ExecutionOutcome> + Send + Sync,
{
    fn execute(&self, job: &JobContext) -> Result<ExecutionOutcome> {
        self(job)
    }
}

/// Everything an executor needs for one run of one job.
///
/// Built fresh by the worker for every execution: `options` is a private
/// copy, and `hooks` holds the caller's hooks followed by the queue's own.
pub struct JobContext {
    task_id: String,
    target: String,
    options: DownloadOptions,
    hooks: Vec<ProgressHook>,
}

impl JobContext {
    pub fn new(
        task_id: impl Into<String>,
        target: impl Into<String>,
        options: DownloadOptions,
        queue_hook: Option<ProgressHook>,
    ) -> Self {
        let mut hooks = options.progress_hooks.clone();
        hooks.extend(queue_hook);
        Self {
            task_id: task_id.into(),
            target: target.into(),
            options,
            hooks,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// URL to fetch
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    pub fn hooks(&self) -> &[ProgressHook] {
        &self.hooks
    }

    /// Deliver a progress event to every hook, in registration order
    pub fn report(&self, event: &ProgressEvent) {
        for hook in &self.hooks {
            hook(event);
        }
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("task_id", &self.task_id)
            .field("target", &self.target)
            .field("options", &self.options)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
