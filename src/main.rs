//! vidqueue - concurrent video downloader
//!
//! Queues every URL given on the command line and downloads them with a
//! bounded pool of yt-dlp workers.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vidqueue::executor::{DownloadOptions, MediaFormat, YtDlpExecutor};
use vidqueue::queue::{ChannelObserver, QueueEvent, QueueManager, TaskStatus};
use vidqueue::utils::{logging, AppSettings, FolderLayout};

#[derive(Parser, Debug)]
#[command(name = "vidqueue", version, about = "Download videos through a bounded worker pool")]
struct Args {
    /// Video or playlist URLs to download
    urls: Vec<String>,

    /// Output format (mp4 or mp3)
    #[arg(short, long)]
    format: Option<MediaFormat>,

    /// Maximum video height, e.g. 720
    #[arg(short, long)]
    resolution: Option<u32>,

    /// Treat URLs as playlists
    #[arg(long)]
    playlist: bool,

    /// Base download directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of concurrent downloads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save_config: bool,

    /// More log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    logging::init_logging(args.verbose);

    let config_path = args.config.clone().unwrap_or_else(AppSettings::default_path);
    let mut settings = AppSettings::load_or_default(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;
    apply_overrides(&mut settings, &args);

    if args.save_config {
        settings.save(&config_path)?;
        println!("Settings written to {}", config_path.display());
    }

    if args.urls.is_empty() {
        if args.save_config {
            return Ok(());
        }
        bail!("No URLs given. Usage: vidqueue <URL>... [--format mp3]");
    }

    let executor = YtDlpExecutor::new(settings.ytdlp_path.as_deref())?;
    let layout = FolderLayout::new(&settings.download_location)?;

    let (observer, events) = ChannelObserver::new();
    let queue = Arc::new(
        QueueManager::builder(executor)
            .config(settings.queue_config())
            .observer(observer)
            .build(),
    );

    install_interrupt_handler(Arc::clone(&queue))?;

    let mut options = DownloadOptions::new(settings.default_format).with_playlist(args.playlist);
    options.resolution = settings.default_resolution;
    let options = layout.apply(options);

    let mut labels: HashMap<String, String> = HashMap::new();
    let mut rejected = 0usize;
    for url in &args.urls {
        match queue.submit(url, &options) {
            Ok(id) => {
                println!("Queued {}", url);
                labels.insert(id, url.clone());
            }
            Err(e) => {
                eprintln!("Skipping {}: {}", url, e);
                rejected += 1;
            }
        }
    }

    let mut last_decile: HashMap<String, u32> = HashMap::new();
    while !labels.is_empty() {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(event) => render_event(&event, &labels, &mut last_decile),
            Err(_) => {
                // Idle only once every terminal event has been sent
                if queue.wait_until_idle(Duration::ZERO) {
                    break;
                }
            }
        }
    }
    for event in events.try_iter() {
        render_event(&event, &labels, &mut last_decile);
    }

    queue.stop();
    let cleaned = layout.cleanup_temp();
    if cleaned > 0 {
        debug!("Removed {} leftover temp entries", cleaned);
    }

    let info = queue.get_queue_info();
    println!(
        "Done: {} completed, {} failed, {} cancelled",
        info.completed, info.failed, info.cancelled
    );
    for task in queue.list_tasks() {
        if task.status == TaskStatus::Completed {
            if let Some(path) = &task.result_location {
                println!("  {} -> {}", task.url, path.display());
            }
        }
    }

    let summary = layout.summary();
    println!(
        "{}: {} video file(s), {} playlist folder(s)",
        summary.base_path.display(),
        summary.videos_count,
        summary.playlist_folders
    );

    let failed = info.failed + rejected;
    if failed > 0 {
        bail!("{} download(s) failed", failed);
    }
    Ok(())
}

fn apply_overrides(settings: &mut AppSettings, args: &Args) {
    if let Some(format) = args.format {
        settings.default_format = format;
    }
    if let Some(resolution) = args.resolution {
        settings.default_resolution = Some(resolution);
    }
    if let Some(output) = &args.output {
        settings.download_location = output.clone();
    }
    if let Some(workers) = args.workers {
        settings.max_workers = workers;
    }
    *settings = settings.clone().normalized();
}

/// First Ctrl-C cancels everything still queued and lets running downloads
/// finish; a second one exits immediately.
fn install_interrupt_handler(queue: Arc<QueueManager>) -> Result<()> {
    let interrupted = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("Aborting");
            std::process::exit(130);
        }
        let cancelled = queue
            .list_tasks()
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| queue.cancel(&t.id))
            .count();
        eprintln!(
            "Interrupted: cancelled {} queued download(s), waiting for running ones (Ctrl-C again to abort)",
            cancelled
        );
    })
    .context("Failed to install Ctrl-C handler")
}

fn render_event(
    event: &QueueEvent,
    labels: &HashMap<String, String>,
    last_decile: &mut HashMap<String, u32>,
) {
    let label = |id: &str| labels.get(id).cloned().unwrap_or_else(|| id.to_string());
    match event {
        QueueEvent::TaskStarted { task_id, .. } => println!("Downloading {}", label(task_id)),
        QueueEvent::TaskProgress {
            task_id, progress, ..
        } => {
            let decile = (*progress / 10.0).floor() as u32;
            let last = last_decile.entry(task_id.clone()).or_insert(0);
            if decile > *last {
                *last = decile;
                println!("  {:>5.1}%  {}", progress, label(task_id));
            }
        }
        QueueEvent::TaskCompleted { task_id, .. } => println!("Finished {}", label(task_id)),
        QueueEvent::TaskFailed { task_id, error, .. } => {
            eprintln!("Failed {}: {}", label(task_id), error)
        }
        QueueEvent::QueueEmpty { .. } => {}
    }
}
