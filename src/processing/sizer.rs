//! Ceiling-driven thumbnail sizing
//!
//! The encoded size of a thumbnail depends on content and encoder in ways
//! that cannot be predicted from pixel counts, so the sizer measures instead:
//! it scales, encodes, writes, and checks the byte length on disk, then
//! adjusts the scale ratio.

use std::path::Path;

use image::DynamicImage;
use serde::Serialize;
use tracing::debug;

use crate::config::{FilterType, FinalArtifact, SearchStrategy, ThumbnailConfig};
use crate::error::{Result, ThumbError};
use crate::processing::codec;
use crate::processing::formats::OutputFormat;

/// Target dimensions for a ratio: floor of each axis, never below one pixel
pub fn candidate_size(width: u32, height: u32, ratio: f64) -> (u32, u32) {
    let scale = |dimension: u32| ((f64::from(dimension) * ratio).floor() as u32).max(1);
    (scale(width), scale(height))
}

/// The shrinking ratio bracket of the binary search.
///
/// `0 <= min_ratio <= max_ratio <= 1` holds throughout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchState {
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub precision: f64,
}

impl SearchState {
    pub fn new(precision: f64) -> Self {
        Self {
            min_ratio: 0.0,
            max_ratio: 1.0,
            precision,
        }
    }

    /// The bracket is narrower than the precision, or too narrow to split
    pub fn is_done(&self) -> bool {
        let mid = self.midpoint();
        self.max_ratio - self.min_ratio <= self.precision
            || mid <= self.min_ratio
            || mid >= self.max_ratio
    }

    pub fn midpoint(&self) -> f64 {
        (self.min_ratio + self.max_ratio) / 2.0
    }

    /// Narrow the bracket around a tested ratio
    pub fn record(&mut self, ratio: f64, under_ceiling: bool) {
        if under_ceiling {
            self.min_ratio = ratio;
        } else {
            self.max_ratio = ratio;
        }
    }
}

/// One scale-encode-write-measure round
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trial {
    pub ratio: f64,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

/// What a sizing run did and what it left on disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizingOutcome {
    /// Every trial, in the order it ran
    pub trials: Vec<Trial>,
    /// The encoding currently in the output file
    pub on_disk: Trial,
    /// Final ratio bracket (binary search only)
    pub bracket: Option<SearchState>,
    /// The best under-ceiling encoding was written back after the search
    pub restored_best: bool,
}

impl SizingOutcome {
    pub fn iterations(&self) -> usize {
        self.trials.len()
    }

    /// Largest ratio whose encoding came in under the ceiling
    pub fn best_accepted(&self, ceiling: u64) -> Option<&Trial> {
        self.trials
            .iter()
            .filter(|t| t.bytes < ceiling)
            .max_by(|a, b| a.ratio.total_cmp(&b.ratio))
    }
}

/// Searches for a scale ratio whose encoding fits under the byte ceiling
#[derive(Debug, Clone)]
pub struct ThumbnailSizer {
    config: ThumbnailConfig,
}

impl ThumbnailSizer {
    pub fn new(config: ThumbnailConfig) -> Result<Self> {
        config.validate_precision()?;
        if config.ceiling_bytes == 0 {
            return Err(ThumbError::config("Ceiling must be greater than 0 bytes"));
        }
        config.strategy.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    /// Size `raster` against the ceiling, writing every trial to `output`.
    ///
    /// A failure leaves whatever the last successful trial wrote in place.
    pub fn run(&self, raster: &DynamicImage, output: &Path) -> Result<SizingOutcome> {
        if raster.width() == 0 || raster.height() == 0 {
            return Err(ThumbError::scale(
                format!("Cannot scale a {}x{} raster", raster.width(), raster.height()),
                None,
            ));
        }

        let format = OutputFormat::for_path(output, self.config.jpeg_quality)?;

        match self.config.strategy {
            SearchStrategy::BinarySearch => self.binary_search(raster, output, format),
            SearchStrategy::FixedStep {
                factor,
                max_iterations,
            } => self.fixed_step(raster, output, format, factor, max_iterations),
        }
    }

    fn binary_search(
        &self,
        raster: &DynamicImage,
        output: &Path,
        format: OutputFormat,
    ) -> Result<SizingOutcome> {
        let ceiling = self.config.ceiling_bytes;
        let mut state = SearchState::new(self.config.precision);
        let mut trials = Vec::new();
        let mut best: Option<(Trial, Vec<u8>)> = None;

        debug!(
            "Binary search over {}x{}: at most {} trials",
            raster.width(),
            raster.height(),
            self.config.max_binary_iterations()
        );

        while !state.is_done() {
            let ratio = state.midpoint();
            let size = candidate_size(raster.width(), raster.height(), ratio);
            let (trial, encoded) = self.trial(raster, ratio, size, format, output)?;

            let under = trial.bytes < ceiling;
            state.record(ratio, under);
            if under && self.config.final_artifact == FinalArtifact::BestAccepted {
                best = Some((trial, encoded));
            }
            trials.push(trial);
        }

        let Some(&last) = trials.last() else {
            return Err(ThumbError::config("Search precision leaves nothing to test"));
        };

        let mut on_disk = last;
        let mut restored_best = false;
        if last.bytes >= ceiling {
            if let Some((trial, encoded)) = best {
                debug!("Restoring best accepted ratio {:.4} ({} bytes)", trial.ratio, trial.bytes);
                write_output(output, &encoded)?;
                on_disk = Trial {
                    bytes: measure(output)?,
                    ..trial
                };
                restored_best = true;
            }
        }

        Ok(SizingOutcome {
            trials,
            on_disk,
            bracket: Some(state),
            restored_best,
        })
    }

    fn fixed_step(
        &self,
        raster: &DynamicImage,
        output: &Path,
        format: OutputFormat,
        factor: f64,
        max_iterations: u32,
    ) -> Result<SizingOutcome> {
        let ceiling = self.config.ceiling_bytes;
        let mut ratio = factor;
        let mut size = candidate_size(raster.width(), raster.height(), factor);
        let mut trials: Vec<Trial> = Vec::new();

        loop {
            let (trial, _) = self.trial(raster, ratio, size, format, output)?;
            trials.push(trial);

            if trial.bytes <= ceiling {
                return Ok(SizingOutcome {
                    trials,
                    on_disk: trial,
                    bracket: None,
                    restored_best: false,
                });
            }

            if size == (1, 1) || trials.len() >= max_iterations as usize {
                let smallest = trials.iter().map(|t| t.bytes).min().unwrap_or(trial.bytes);
                return Err(ThumbError::ceiling_unreachable(
                    ceiling,
                    trials.len() as u32,
                    smallest,
                    None,
                ));
            }

            size = candidate_size(size.0, size.1, factor);
            ratio *= factor;
        }
    }

    /// Scale, encode, write, and measure once
    fn trial(
        &self,
        raster: &DynamicImage,
        ratio: f64,
        (width, height): (u32, u32),
        format: OutputFormat,
        output: &Path,
    ) -> Result<(Trial, Vec<u8>)> {
        let encoded = if (width, height) == (raster.width(), raster.height()) {
            codec::encode(raster, format)?
        } else {
            codec::encode(&scale(raster, width, height, self.config.filter), format)?
        };

        write_output(output, &encoded)?;
        let bytes = measure(output)?;

        debug!(
            "Trial ratio {:.4}: {}x{} -> {} bytes (ceiling {})",
            ratio, width, height, bytes, self.config.ceiling_bytes
        );

        Ok((
            Trial {
                ratio,
                width,
                height,
                bytes,
            },
            encoded,
        ))
    }
}

/// Resample to exact dimensions
pub fn scale(raster: &DynamicImage, width: u32, height: u32, filter: FilterType) -> DynamicImage {
    raster.resize_exact(width, height, filter.into())
}

fn write_output(output: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(output, bytes).map_err(|e| ThumbError::write(e, None))
}

fn measure(output: &Path) -> Result<u64> {
    std::fs::metadata(output)
        .map(|m| m.len())
        .map_err(|e| ThumbError::write(e, None))
}
