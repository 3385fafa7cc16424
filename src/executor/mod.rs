pub mod models;
pub mod traits;
pub mod ytdlp;

pub use models::{
    DownloadOptions, ExecutionOutcome, MediaFormat, ProgressEvent, ProgressHook,
    DEFAULT_OUTPUT_TEMPLATE,
};
pub use traits::{Executor, JobContext};
pub use ytdlp::YtDlpExecutor;
