pub mod events;
mod fifo;
pub mod manager;
mod registry;
pub mod task;
mod worker;

pub use events::{ChannelObserver, EventDispatcher, NoopObserver, QueueEvent, QueueObserver};
pub use manager::{QueueManager, QueueManagerBuilder};
pub use task::{DownloadTask, QueueInfo, TaskStatus};
