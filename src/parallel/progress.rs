//! Progress tracking for batch runs

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}, {eta}) {msg}";

/// Thread-safe progress tracker shared by every worker of a batch
pub struct ProgressTracker {
    total_files: u64,
    start_time: Instant,
    bar: ProgressBar,

    // Atomic counters for updates from worker threads
    completed: AtomicUsize,
    failed: AtomicUsize,
    bytes_written: AtomicU64,
}

/// Snapshot of batch progress
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub total_files: u64,
    pub completed_files: usize,
    pub failed_files: usize,
    pub elapsed_time: Duration,
    pub estimated_remaining: Option<Duration>,
    pub bytes_written: u64,
    pub files_per_second: f64,
    pub completion_percentage: f64,
}

impl ProgressTracker {
    /// Tracker with a terminal progress bar
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self::with_bar(total_files, bar)
    }

    /// Tracker that counts without drawing anything
    pub fn hidden(total_files: u64) -> Self {
        Self::with_bar(total_files, ProgressBar::hidden())
    }

    fn with_bar(total_files: u64, bar: ProgressBar) -> Self {
        Self {
            total_files,
            start_time: Instant::now(),
            bar,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Start tracking one file; it counts as failed unless the guard is finished
    pub fn start_file(self: &Arc<Self>) -> FileProgress {
        FileProgress {
            tracker: Arc::clone(self),
            outcome: None,
        }
    }

    /// Mark a file as finished
    pub fn complete_file(&self, success: bool, bytes_written: u64) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
            self.bytes_written.fetch_add(bytes_written, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.bar
                .set_message(format!("{} failed", self.failed.load(Ordering::Relaxed)));
        }
        self.bar.inc(1);
    }

    /// Get current progress state
    pub fn state(&self) -> ProgressState {
        let elapsed = self.start_time.elapsed();
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total_processed = completed + failed;

        let mut state = ProgressState {
            total_files: self.total_files,
            completed_files: completed,
            failed_files: failed,
            elapsed_time: elapsed,
            estimated_remaining: None,
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            files_per_second: 0.0,
            completion_percentage: 0.0,
        };

        if self.total_files > 0 {
            state.completion_percentage =
                (total_processed as f64 / self.total_files as f64) * 100.0;
        }

        if elapsed.as_secs_f64() > 0.0 {
            state.files_per_second = total_processed as f64 / elapsed.as_secs_f64();

            if total_processed > 0 && self.total_files > total_processed as u64 {
                let remaining_files = self.total_files - total_processed as u64;
                let avg_time_per_file = elapsed.as_secs_f64() / total_processed as f64;
                state.estimated_remaining =
                    Some(Duration::from_secs_f64(remaining_files as f64 * avg_time_per_file));
            }
        }

        state
    }

    /// Close the bar and log the totals
    pub fn finish(&self) {
        let state = self.state();
        self.bar.finish_and_clear();
        info!(
            "Batch completed: {}/{} files successful in {:.2}s ({})",
            state.completed_files,
            state.total_files,
            state.elapsed_time.as_secs_f64(),
            state.speed_text()
        );
    }
}

/// Progress for one in-flight file, recorded when dropped.
///
/// A job that unwinds before calling `finish` is counted as failed, so the
/// bar still reaches its total.
pub struct FileProgress {
    tracker: Arc<ProgressTracker>,
    outcome: Option<(bool, u64)>,
}

impl FileProgress {
    pub fn finish(mut self, success: bool, bytes_written: u64) {
        self.outcome = Some((success, bytes_written));
    }
}

impl Drop for FileProgress {
    fn drop(&mut self) {
        let (success, bytes_written) = self.outcome.take().unwrap_or((false, 0));
        self.tracker.complete_file(success, bytes_written);
    }
}

impl ProgressState {
    /// Get human-readable completion status
    pub fn status_text(&self) -> String {
        if self.completion_percentage >= 100.0 {
            "Completed".to_string()
        } else {
            format!(
                "{}/{} files processed",
                self.completed_files + self.failed_files,
                self.total_files
            )
        }
    }

    /// Get estimated time remaining as human-readable string
    pub fn eta_text(&self) -> String {
        match self.estimated_remaining {
            Some(duration) => {
                let seconds = duration.as_secs();
                if seconds < 60 {
                    format!("{}s", seconds)
                } else if seconds < 3600 {
                    format!("{}m {}s", seconds / 60, seconds % 60)
                } else {
                    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
                }
            }
            None => "Unknown".to_string(),
        }
    }

    /// Get processing speed as human-readable string
    pub fn speed_text(&self) -> String {
        if self.files_per_second >= 1.0 {
            format!("{:.1} files/sec", self.files_per_second)
        } else if self.files_per_second > 0.0 {
            format!("{:.1} sec/file", 1.0 / self.files_per_second)
        } else {
            "Unknown".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts() {
        let tracker = ProgressTracker::hidden(4);
        tracker.complete_file(true, 1000);
        tracker.complete_file(false, 0);
        tracker.complete_file(true, 500);

        let state = tracker.state();
        assert_eq!(state.completed_files, 2);
        assert_eq!(state.failed_files, 1);
        assert_eq!(state.bytes_written, 1500);
        assert_eq!(state.completion_percentage, 75.0);
        assert_eq!(state.status_text(), "3/4 files processed");
    }

    #[test]
    fn test_progress_from_many_threads() {
        let tracker = Arc::new(ProgressTracker::hidden(100));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        tracker.complete_file(true, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = tracker.state();
        assert_eq!(state.completed_files, 100);
        assert_eq!(state.status_text(), "Completed");
        tracker.finish();
    }

    #[test]
    fn test_unfinished_file_counts_as_failed() {
        let tracker = Arc::new(ProgressTracker::hidden(3));
        tracker.start_file().finish(true, 10);
        drop(tracker.start_file());

        let unwinding = Arc::clone(&tracker);
        let joined = std::thread::spawn(move || {
            let _file = unwinding.start_file();
            panic!("worker died mid-file");
        })
        .join();
        assert!(joined.is_err());

        let state = tracker.state();
        assert_eq!(state.completed_files, 1);
        assert_eq!(state.failed_files, 2);
        assert_eq!(state.bytes_written, 10);
        assert_eq!(state.status_text(), "Completed");
    }

    #[test]
    fn test_progress_state_text() {
        let state = ProgressState {
            total_files: 10,
            completed_files: 5,
            failed_files: 0,
            elapsed_time: Duration::from_secs(10),
            estimated_remaining: Some(Duration::from_secs(125)),
            bytes_written: 0,
            files_per_second: 0.5,
            completion_percentage: 50.0,
        };

        assert_eq!(state.eta_text(), "2m 5s");
        assert_eq!(state.speed_text(), "2.0 sec/file");
    }
}
