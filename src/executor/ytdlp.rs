//! yt-dlp backed executor
//!
//! Runs the yt-dlp binary as a blocking child process, turning its
//! machine-readable progress lines into [`ProgressEvent`]s.
//! Supports an explicitly configured binary as well as a system-installed one.

use crate::executor::models::{DownloadOptions, ExecutionOutcome, MediaFormat, ProgressEvent};
use crate::executor::traits::{Executor, JobContext};
use crate::utils::error::QueueError;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Prefix marking our progress template lines on stdout
const PROGRESS_PREFIX: &str = "[vidqueue]";

const PROGRESS_TEMPLATE: &str = "download:[vidqueue] %(progress.downloaded_bytes)s \
%(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";

/// Executor that shells out to yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpExecutor {
    ytdlp_path: PathBuf,
}

impl YtDlpExecutor {
    /// Locate yt-dlp and build an executor around it
    ///
    /// Search order:
    /// 1. `preferred`, when given and present
    /// 2. System PATH
    /// 3. Common installation paths
    pub fn new(preferred: Option<&Path>) -> Result<Self, QueueError> {
        match find_ytdlp(preferred) {
            Some(path) => {
                info!("Found yt-dlp at: {}", path.display());
                Ok(Self { ytdlp_path: path })
            }
            None => {
                error!("yt-dlp not found anywhere!");
                Err(QueueError::YtDlpNotFound)
            }
        }
    }

    /// Use a specific binary without probing for it
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_path: path.into(),
        }
    }

    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }

    /// Command line arguments for one job (binary path excluded)
    pub fn build_args(target: &str, options: &DownloadOptions) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
        ];

        let output = match &options.output_dir {
            Some(dir) => dir.join(&options.output_template).to_string_lossy().into_owned(),
            None => options.output_template.clone(),
        };
        args.push("-o".to_string());
        args.push(output);

        match options.format {
            MediaFormat::Mp3 => {
                args.extend(
                    ["-f", "bestaudio/best", "-x", "--audio-format", "mp3"]
                        .iter()
                        .map(|s| s.to_string()),
                );
            }
            MediaFormat::Mp4 => {
                let selector = match options.resolution {
                    Some(height) => format!(
                        "bestvideo[height<={h}]+bestaudio/best[height<={h}]",
                        h = height
                    ),
                    None => "bestvideo+bestaudio/best".to_string(),
                };
                args.push("-f".to_string());
                args.push(selector);
                args.push("--merge-output-format".to_string());
                args.push("mp4".to_string());
            }
        }

        args.push(if options.playlist {
            "--yes-playlist".to_string()
        } else {
            "--no-playlist".to_string()
        });

        for (key, value) in &options.extra {
            let flag = format!("--{}", key.replace('_', "-"));
            match value {
                serde_json::Value::Bool(true) | serde_json::Value::Null => args.push(flag),
                serde_json::Value::Bool(false) => {}
                serde_json::Value::String(s) => {
                    args.push(flag);
                    args.push(s.clone());
                }
                other => {
                    args.push(flag);
                    args.push(other.to_string());
                }
            }
        }

        args.push(target.to_string());
        args
    }
}

impl Executor for YtDlpExecutor {
    fn execute(&self, job: &JobContext) -> Result<ExecutionOutcome> {
        let args = Self::build_args(job.target(), job.options());
        debug!("Task {}: running {} {:?}", job.task_id(), self.ytdlp_path.display(), args);

        let mut child = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.ytdlp_path.display()))?;

        // Drain stderr on its own thread so a chatty child never blocks on a full pipe
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let mut destination: Option<PathBuf> = None;
        if let Some(stdout) = child.stdout.take() {
            // Titles in file names aren't always valid UTF-8
            for line in BufReader::new(stdout).split(b'\n') {
                let line = match line {
                    Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
                    Err(e) => {
                        warn!("Task {}: unreadable yt-dlp output: {}", job.task_id(), e);
                        break;
                    }
                };
                if let Some(event) = parse_progress_line(&line) {
                    job.report(&event);
                } else if let Some(path) = parse_destination_line(&line) {
                    debug!("Task {}: destination {}", job.task_id(), path.display());
                    destination = Some(path);
                }
            }
        }

        let status = child.wait().context("Failed to wait for yt-dlp")?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            job.report(&ProgressEvent::Error {
                message: message.clone(),
            });
            return Err(QueueError::DownloadError(message).into());
        }

        job.report(&ProgressEvent::Finished {
            filename: destination.clone(),
        });
        Ok(ExecutionOutcome {
            output_path: destination,
        })
    }
}

fn parse_field(token: Option<&str>) -> Option<f64> {
    token
        .filter(|t| *t != "NA" && *t != "None")
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parse a line produced by our `--progress-template`
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();

    let downloaded = parse_field(fields.next());
    let total = parse_field(fields.next());
    let estimate = parse_field(fields.next());
    let speed = parse_field(fields.next());
    let eta = parse_field(fields.next());

    Some(ProgressEvent::Downloading {
        downloaded_bytes: downloaded.map(|v| v as u64).unwrap_or(0),
        total_bytes: total.map(|v| v as u64),
        total_bytes_estimate: estimate.map(|v| v as u64),
        speed,
        eta: eta.map(Duration::from_secs_f64),
    })
}

/// Extract the output file path from yt-dlp's informational lines
pub fn parse_destination_line(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    let path = if let Some(rest) = line.strip_prefix("[download] Destination:") {
        rest
    } else if let Some(rest) = line.strip_prefix("[ExtractAudio] Destination:") {
        rest
    } else if let Some(rest) = line.strip_prefix("[Merger] Merging formats into") {
        rest
    } else if let Some(rest) = line.strip_prefix("[download] ") {
        rest.strip_suffix(" has already been downloaded")?
    } else {
        return None;
    };

    let path = path.trim().trim_matches('"');
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

// ============================================================
// yt-dlp Detection Functions
// ============================================================

/// Find yt-dlp binary, preferring an explicitly configured path
pub fn find_ytdlp(preferred: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = preferred {
        if is_executable(path) {
            return Some(path.to_path_buf());
        }
        warn!("Configured yt-dlp path is not executable: {}", path.display());
    }

    if let Ok(path) = which::which("yt-dlp") {
        debug!("Using system yt-dlp: {:?}", path);
        return Some(path);
    }

    if let Some(common) = find_in_common_paths() {
        debug!("Using yt-dlp from common path: {:?}", common);
        return Some(common);
    }

    None
}

fn find_in_common_paths() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from("/opt/homebrew/bin/yt-dlp"),
        PathBuf::from("/usr/local/bin/yt-dlp"),
        PathBuf::from("/usr/bin/yt-dlp"),
    ];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local").join("bin").join("yt-dlp"));
    }

    candidates.into_iter().find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
