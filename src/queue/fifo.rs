//! Unbounded FIFO of task ids waiting for a worker

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Multi-consumer FIFO. Every id is delivered to exactly one worker.
#[derive(Debug, Clone)]
pub(crate) struct TaskQueue {
    sender: Sender<String>,
    receiver: Receiver<String>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    pub fn push(&self, task_id: String) {
        // Both ends live in `self`, so the channel can't be disconnected
        let _ = self.sender.send(task_id);
    }

    /// Wait up to `timeout` for the next id
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        match self.receiver.recv_timeout(timeout) {
            Ok(id) => Some(id),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Ids not yet handed to a worker
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}
