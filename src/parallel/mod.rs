//! Batch execution over a bounded worker pool

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use console::style;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{FailureKind, Result, ThumbError};
use crate::processing::{ThumbnailEngine, ThumbnailResult};

pub mod pool;
pub mod progress;

pub use pool::*;
pub use progress::*;

/// Runs one decode -> normalize -> size pipeline per input on a worker pool
pub struct BatchExecutor {
    engine: Arc<ThumbnailEngine>,
    workers: usize,
}

impl BatchExecutor {
    pub fn new(engine: ThumbnailEngine, workers: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            workers: workers.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ThumbnailEngine::from_config(config)?,
            config.batch.worker_count(),
        ))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn engine(&self) -> &ThumbnailEngine {
        &self.engine
    }

    /// Pair every input with its output path.
    ///
    /// Outputs mirror the input's path below `input_dir`, so distinct inputs
    /// never share an output file.
    pub fn plan(input_dir: &Path, inputs: &[PathBuf], output_dir: &Path) -> Vec<(PathBuf, PathBuf)> {
        inputs
            .iter()
            .map(|input| (input.clone(), output_path(input, input_dir, output_dir)))
            .collect()
    }

    /// Process every input, draining the whole batch whatever fails
    pub fn run(
        &self,
        input_dir: &Path,
        inputs: Vec<PathBuf>,
        output_dir: &Path,
        progress: &Arc<ProgressTracker>,
    ) -> Result<BatchReport> {
        let start_time = Instant::now();
        let ceiling = self.engine.sizer().config().ceiling_bytes;

        info!(
            "Starting batch of {} files on {} workers",
            inputs.len(),
            self.workers
        );

        std::fs::create_dir_all(output_dir).map_err(|e| {
            ThumbError::config(format!(
                "Failed to create output directory {:?}: {}",
                output_dir, e
            ))
        })?;

        let plan = Self::plan(input_dir, &inputs, output_dir);
        let mut pool = WorkerPool::new(self.workers)?;

        for (input, output) in plan.iter().cloned() {
            let engine = Arc::clone(&self.engine);
            let progress = Arc::clone(progress);

            pool.submit(move || {
                let file = progress.start_file();
                let outcome = run_task(&engine, input, output, ceiling);
                match &outcome.status {
                    TaskStatus::Succeeded { bytes, .. } => file.finish(true, *bytes),
                    _ => file.finish(false, 0),
                }
                outcome
            });
        }

        let outcomes = pool
            .await_all()
            .into_iter()
            .zip(plan)
            .map(|(result, (input, output))| {
                result.unwrap_or_else(|message| {
                    warn!("Worker panicked on {:?}: {}", input, message);
                    TaskOutcome {
                        input,
                        output,
                        status: TaskStatus::Panicked { message },
                    }
                })
            })
            .collect();

        let report = BatchReport::new(outcomes, ceiling, start_time.elapsed());
        info!(
            "Batch finished: {} succeeded, {} failed in {:.2}s",
            report.succeeded,
            report.failed,
            report.elapsed_secs
        );

        Ok(report)
    }
}

fn output_path(input: &Path, input_dir: &Path, output_dir: &Path) -> PathBuf {
    match input.strip_prefix(input_dir) {
        Ok(relative) if relative.file_name().is_some() => output_dir.join(relative),
        _ => output_dir.join(input.file_name().unwrap_or(input.as_os_str())),
    }
}

/// One task, caught at the task boundary
fn run_task(engine: &ThumbnailEngine, input: PathBuf, output: PathBuf, ceiling: u64) -> TaskOutcome {
    let result = prepare_output(&output).and_then(|()| engine.process(&input, &output));

    let status = match result {
        Ok(result) => TaskStatus::from_result(&result, ceiling),
        Err(error) => {
            let kind = error.kind();
            warn!(
                "Failed {:?}: {} {}",
                input,
                kind.map_or("Error", FailureKind::as_str),
                error.user_message()
            );
            TaskStatus::Failed {
                kind,
                message: error.detail(),
            }
        }
    };

    TaskOutcome {
        input,
        output,
        status,
    }
}

fn prepare_output(output: &Path) -> Result<()> {
    match output.parent() {
        Some(parent) => std::fs::create_dir_all(parent).map_err(|e| ThumbError::write(e, None)),
        None => Ok(()),
    }
}

/// What happened to one input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(flatten)]
    pub status: TaskStatus,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded {
        width: u32,
        height: u32,
        bytes: u64,
        trials: usize,
        under_ceiling: bool,
        truncated: bool,
        source_bytes: u64,
    },
    Failed {
        kind: Option<FailureKind>,
        message: String,
    },
    Panicked {
        message: String,
    },
}

impl TaskStatus {
    fn from_result(result: &ThumbnailResult, ceiling: u64) -> Self {
        let on_disk = result.outcome.on_disk;
        Self::Succeeded {
            width: on_disk.width,
            height: on_disk.height,
            bytes: on_disk.bytes,
            trials: result.outcome.iterations(),
            under_ceiling: result.under_ceiling(ceiling),
            truncated: result.truncated,
            source_bytes: result.source_bytes,
        }
    }
}

/// Final tally of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub ceiling: u64,
    pub elapsed_secs: f64,
    /// Sorted by input path
    pub outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    pub fn new(mut outcomes: Vec<TaskOutcome>, ceiling: u64, elapsed: Duration) -> Self {
        outcomes.sort_by(|a, b| a.input.cmp(&b.input));
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();

        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            ceiling,
            elapsed_secs: elapsed.as_secs_f64(),
            outcomes,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Successful thumbnails whose final file is still at or over the ceiling
    pub fn over_ceiling(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, TaskStatus::Succeeded { under_ceiling: false, .. }))
            .count()
    }

    fn byte_totals(&self) -> (u64, u64) {
        self.outcomes
            .iter()
            .fold((0, 0), |(source, written), o| match o.status {
                TaskStatus::Succeeded {
                    source_bytes, bytes, ..
                } => (source + source_bytes, written + bytes),
                _ => (source, written),
            })
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!();
        println!("{}", style("Batch Results:").bold());
        println!("  Successful: {}", style(self.succeeded).green());
        if self.failed > 0 {
            println!("  Failed: {}", style(self.failed).red());
        }
        let over = self.over_ceiling();
        if over > 0 {
            println!("  Over ceiling: {}", style(over).yellow());
        }
        println!("  Duration: {:.2}s", self.elapsed_secs);

        if self.succeeded > 0 {
            let (source, written) = self.byte_totals();
            println!(
                "  Size: {:.2}MB -> {:.2}MB (ceiling {:.1} KiB)",
                source as f64 / 1024.0 / 1024.0,
                written as f64 / 1024.0 / 1024.0,
                self.ceiling as f64 / 1024.0
            );
        }

        if self.failed > 0 {
            println!("\n{}", style("Errors:").bold());
            for (i, outcome) in self.failures().enumerate() {
                let (kind, message) = match &outcome.status {
                    TaskStatus::Failed { kind, message } => {
                        (kind.map_or("Error", FailureKind::as_str), message.as_str())
                    }
                    TaskStatus::Panicked { message } => ("Panic", message.as_str()),
                    TaskStatus::Succeeded { .. } => continue,
                };
                println!("  {}: {} {}: {}", i + 1, outcome.input.display(), kind, message);
            }
        }
    }
}
