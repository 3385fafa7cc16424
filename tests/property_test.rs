//! Property checks for the pure pieces: progress math, queue accounting and name sanitizing

use proptest::prelude::*;
use vidqueue::executor::{DownloadOptions, MediaFormat, ProgressEvent};
use vidqueue::queue::{DownloadTask, QueueInfo, TaskStatus};
use vidqueue::utils::organizer::MAX_NAME_LEN;
use vidqueue::utils::sanitize_name;

fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::Downloading),
        Just(TaskStatus::Completed),
        Just(TaskStatus::Failed),
        Just(TaskStatus::Cancelled),
    ]
}

proptest! {
    #[test]
    fn percentage_stays_in_range(
        downloaded in any::<u64>(),
        total in proptest::option::of(any::<u64>()),
        estimate in proptest::option::of(any::<u64>()),
    ) {
        let event = ProgressEvent::Downloading {
            downloaded_bytes: downloaded,
            total_bytes: total,
            total_bytes_estimate: estimate,
            speed: None,
            eta: None,
        };
        match event.percentage() {
            Some(pct) => prop_assert!((0.0..=100.0).contains(&pct)),
            None => prop_assert!(
                total.unwrap_or(0) == 0 && estimate.unwrap_or(0) == 0
            ),
        }
    }

    #[test]
    fn exact_total_wins_over_estimate(
        total in 1u64..1_000_000,
        estimate in 1u64..1_000_000,
        fraction in 0.0f64..=1.0,
    ) {
        let downloaded = (total as f64 * fraction) as u64;
        let event = ProgressEvent::Downloading {
            downloaded_bytes: downloaded,
            total_bytes: Some(total),
            total_bytes_estimate: Some(estimate),
            speed: None,
            eta: None,
        };
        prop_assert_eq!(event.percentage(), ProgressEvent::downloading(downloaded, total).percentage());
    }

    #[test]
    fn queue_info_buckets_sum_to_total(
        statuses in proptest::collection::vec(status_strategy(), 0..64),
        running in any::<bool>(),
    ) {
        let tasks: Vec<DownloadTask> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut task = DownloadTask::new(
                    format!("https://example.com/{}", i),
                    DownloadOptions::default(),
                    i as u64,
                );
                task.status = *status;
                task
            })
            .collect();

        let info = QueueInfo::from_tasks(&tasks, running);
        prop_assert_eq!(info.total, tasks.len());
        prop_assert_eq!(
            info.pending + info.downloading + info.completed + info.failed + info.cancelled,
            info.total
        );
        prop_assert_eq!(info.is_running, running);
        prop_assert_eq!(
            info.is_idle(),
            statuses.iter().all(|s| s.is_terminal())
        );
    }

    #[test]
    fn sanitized_names_are_single_components(name in ".*") {
        let clean = sanitize_name(&name);
        prop_assert!(!clean.is_empty());
        prop_assert!(clean.chars().count() <= MAX_NAME_LEN);
        prop_assert!(!clean.contains('/'));
        prop_assert!(!clean.contains('\\'));
        prop_assert!(!clean.chars().any(char::is_control));
        prop_assert!(clean != "." && clean != "..");
    }

    #[test]
    fn media_format_parse_is_case_insensitive(upper in any::<bool>(), audio in any::<bool>()) {
        let raw = match (audio, upper) {
            (true, true) => "MP3",
            (true, false) => "mp3",
            (false, true) => "MP4",
            (false, false) => "mp4",
        };
        let format: MediaFormat = raw.parse().unwrap();
        prop_assert_eq!(format.is_video(), !audio);
    }
}
