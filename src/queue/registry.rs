//! Active task registry. Not synchronized itself: the worker pool keeps it
//! behind a single mutex and every method here runs under that lock.

use crate::executor::{DownloadOptions, ExecutionOutcome};
use crate::queue::task::{DownloadTask, QueueInfo, TaskStatus};
use std::collections::HashMap;
use std::path::PathBuf;

/// Result of trying to hand a task to a worker
#[derive(Debug)]
pub(crate) enum Claim {
    /// Task moved to Downloading; snapshot taken right after the transition
    Started(DownloadTask),
    /// Task exists but isn't Pending (cancelled while queued)
    Skipped(TaskStatus),
    /// Unknown id
    Missing,
}

/// A terminal transition performed by a worker
#[derive(Debug)]
pub(crate) struct Finished {
    pub task: DownloadTask,
    /// Nothing Pending or Downloading remains
    pub queue_idle: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    tasks: HashMap<String, DownloadTask>,
    history: Vec<DownloadTask>,
    next_sequence: u64,
    /// Terminal transitions whose callbacks have not returned yet
    dispatching: usize,
}

impl Registry {
    /// Register a new pending task and return its snapshot
    pub fn insert(&mut self, url: &str, options: DownloadOptions) -> DownloadTask {
        let task = DownloadTask::new(url, options, self.next_sequence);
        self.next_sequence += 1;
        self.tasks.insert(task.id.clone(), task.clone());
        task
    }

    pub fn get(&self, task_id: &str) -> Option<DownloadTask> {
        self.tasks.get(task_id).cloned()
    }

    pub fn all(&self) -> HashMap<String, DownloadTask> {
        self.tasks.clone()
    }

    /// Active tasks in submission order
    pub fn ordered(&self) -> Vec<DownloadTask> {
        let mut tasks: Vec<DownloadTask> = self.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.sequence);
        tasks
    }

    pub fn history(&self) -> Vec<DownloadTask> {
        self.history.clone()
    }

    pub fn info(&self, is_running: bool) -> QueueInfo {
        QueueInfo::from_tasks(self.tasks.values(), is_running)
    }

    /// Nothing Pending or Downloading, and every terminal callback delivered
    pub fn is_idle(&self) -> bool {
        self.dispatching == 0 && self.info(false).is_idle()
    }

    pub fn claim(&mut self, task_id: &str) -> Claim {
        match self.tasks.get_mut(task_id) {
            Some(task) => {
                if task.begin() {
                    Claim::Started(task.clone())
                } else {
                    Claim::Skipped(task.status)
                }
            }
            None => Claim::Missing,
        }
    }

    /// Record progress; returns a snapshot only when the value actually rose
    pub fn advance(&mut self, task_id: &str, percentage: f64) -> Option<DownloadTask> {
        let task = self.tasks.get_mut(task_id)?;
        if task.advance_progress(percentage) {
            Some(task.clone())
        } else {
            None
        }
    }

    /// Downloading -> Completed / Failed.
    ///
    /// A successful transition counts as dispatching until the worker calls
    /// [`dispatch_done`](Self::dispatch_done), so waiters don't see the queue
    /// idle before the terminal callbacks ran.
    pub fn finish(
        &mut self,
        task_id: &str,
        outcome: Result<ExecutionOutcome, String>,
        reported_location: Option<PathBuf>,
    ) -> Option<Finished> {
        let task = self.tasks.get_mut(task_id)?;
        let changed = match outcome {
            Ok(outcome) => task.complete(outcome.output_path.or(reported_location)),
            Err(message) => task.fail(message),
        };
        if !changed {
            return None;
        }
        let task = task.clone();
        self.dispatching += 1;
        Some(Finished {
            task,
            queue_idle: self.info(false).is_idle(),
        })
    }

    pub fn dispatch_done(&mut self) {
        self.dispatching = self.dispatching.saturating_sub(1);
    }

    pub fn cancel(&mut self, task_id: &str) -> bool {
        self.tasks
            .get_mut(task_id)
            .map(|task| task.cancel())
            .unwrap_or(false)
    }

    /// Move every terminal task into history; returns how many moved
    pub fn clear_completed(&mut self) -> usize {
        let mut finished: Vec<DownloadTask> = Vec::new();
        self.tasks.retain(|_, task| {
            if task.status.is_terminal() {
                finished.push(task.clone());
                false
            } else {
                true
            }
        });
        finished.sort_by_key(|t| t.sequence);
        let moved = finished.len();
        self.history.extend(finished);
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(n: usize) -> (Registry, Vec<String>) {
        let mut registry = Registry::default();
        let ids = (0..n)
            .map(|i| {
                registry
                    .insert(&format!("https://example.com/{}", i), DownloadOptions::default())
                    .id
            })
            .collect();
        (registry, ids)
    }

    #[test]
    fn test_insert_assigns_increasing_sequence() {
        let (registry, ids) = registry_with(3);
        let ordered = registry.ordered();
        assert_eq!(ordered.len(), 3);
        for (i, task) in ordered.iter().enumerate() {
            assert_eq!(task.sequence, i as u64);
            assert_eq!(task.id, ids[i]);
        }
    }

    #[test]
    fn test_claim_once() {
        let (mut registry, ids) = registry_with(1);
        assert!(matches!(registry.claim(&ids[0]), Claim::Started(_)));
        assert!(matches!(
            registry.claim(&ids[0]),
            Claim::Skipped(TaskStatus::Downloading)
        ));
        assert!(matches!(registry.claim("nope"), Claim::Missing));
    }

    #[test]
    fn test_cancelled_task_is_skipped() {
        let (mut registry, ids) = registry_with(1);
        assert!(registry.cancel(&ids[0]));
        assert!(matches!(
            registry.claim(&ids[0]),
            Claim::Skipped(TaskStatus::Cancelled)
        ));
        assert!(!registry.cancel("unknown"));
    }

    #[test]
    fn test_finish_reports_idle_on_last_task() {
        let (mut registry, ids) = registry_with(2);
        registry.claim(&ids[0]);
        registry.claim(&ids[1]);

        let first = registry
            .finish(&ids[0], Ok(ExecutionOutcome::default()), None)
            .unwrap();
        assert!(!first.queue_idle);

        let second = registry.finish(&ids[1], Err("boom".into()), None).unwrap();
        assert!(second.queue_idle);
        assert_eq!(second.task.error.as_deref(), Some("boom"));

        // Already terminal
        assert!(registry
            .finish(&ids[1], Ok(ExecutionOutcome::default()), None)
            .is_none());
    }

    #[test]
    fn test_not_idle_until_callbacks_delivered() {
        let (mut registry, ids) = registry_with(1);
        registry.claim(&ids[0]);
        let finished = registry
            .finish(&ids[0], Ok(ExecutionOutcome::default()), None)
            .unwrap();

        assert!(finished.queue_idle);
        assert!(!registry.is_idle());
        registry.dispatch_done();
        assert!(registry.is_idle());
    }

    #[test]
    fn test_outcome_path_wins_over_reported() {
        let (mut registry, ids) = registry_with(2);
        registry.claim(&ids[0]);
        registry.claim(&ids[1]);

        let a = registry
            .finish(
                &ids[0],
                Ok(ExecutionOutcome::at("/out/a.mp4")),
                Some(PathBuf::from("/hook/a.mp4")),
            )
            .unwrap();
        assert_eq!(a.task.result_location, Some(PathBuf::from("/out/a.mp4")));

        let b = registry
            .finish(
                &ids[1],
                Ok(ExecutionOutcome::default()),
                Some(PathBuf::from("/hook/b.mp4")),
            )
            .unwrap();
        assert_eq!(b.task.result_location, Some(PathBuf::from("/hook/b.mp4")));
    }

    #[test]
    fn test_advance_only_reports_increases() {
        let (mut registry, ids) = registry_with(1);
        assert!(registry.advance(&ids[0], 10.0).is_none());
        registry.claim(&ids[0]);
        assert_eq!(registry.advance(&ids[0], 10.0).map(|t| t.progress), Some(10.0));
        assert!(registry.advance(&ids[0], 5.0).is_none());
    }

    #[test]
    fn test_clear_completed_moves_terminal_tasks() {
        let (mut registry, ids) = registry_with(4);
        registry.claim(&ids[0]);
        registry.finish(&ids[0], Ok(ExecutionOutcome::default()), None);
        registry.claim(&ids[1]);
        registry.finish(&ids[1], Err("x".into()), None);
        registry.cancel(&ids[2]);

        assert_eq!(registry.clear_completed(), 3);
        let remaining = registry.ordered();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ids[3]);

        let history = registry.history();
        assert_eq!(
            history.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
            ids[..3].to_vec()
        );
        assert_eq!(registry.clear_completed(), 0);
    }
}
