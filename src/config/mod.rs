//! Configuration management for Thumbsizer

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Result, ThumbError};

pub mod strategy;
pub use strategy::*;

/// Default thumbnail byte ceiling (200 KiB)
pub const DEFAULT_CEILING_BYTES: u64 = 200 * 1024;

/// Default width of the ratio bracket at which the search stops
pub const DEFAULT_PRECISION: f64 = 0.01;

/// Narrowest bracket the search will refine to; below this `f64` midpoints stop moving
pub const MIN_PRECISION: f64 = 1e-9;

/// Default decoded pixel limit (10000 x 10700)
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 10_000 * 10_700;

/// Main configuration structure
///
/// Built once at start-up and shared read-only with every worker.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Thumbnail search settings
    pub thumbnails: ThumbnailConfig,

    /// Decoder settings for the image source
    pub decoder: DecoderConfig,

    /// Batch and directory settings
    pub batch: BatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Settings that drive the ratio search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Maximum acceptable encoded size in bytes
    pub ceiling_bytes: u64,

    /// Bracket width at which the binary search stops refining
    pub precision: f64,

    /// JPEG quality (1-100) used when the output is a JPEG file
    pub jpeg_quality: u8,

    /// Resampling filter used for every trial
    pub filter: FilterType,

    /// What ends up on disk after the binary search
    pub final_artifact: FinalArtifact,

    /// Search strategy
    pub strategy: SearchStrategy,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            ceiling_bytes: DEFAULT_CEILING_BYTES,
            precision: DEFAULT_PRECISION,
            jpeg_quality: 75,
            filter: FilterType::default(),
            final_artifact: FinalArtifact::default(),
            strategy: SearchStrategy::default(),
        }
    }
}

impl ThumbnailConfig {
    /// Upper bound on binary search iterations: ceil(log2(1 / precision))
    pub fn max_binary_iterations(&self) -> u32 {
        (1.0 / self.precision).log2().ceil().max(0.0) as u32
    }

    /// Check that the precision lies in `[MIN_PRECISION, 1)`
    pub fn validate_precision(&self) -> Result<()> {
        // A precision of 1 or more would never run a single trial
        if !(self.precision >= MIN_PRECISION && self.precision < 1.0) {
            return Err(ThumbError::config(format!(
                "Precision must be at least {} and below 1, got {}",
                MIN_PRECISION, self.precision
            )));
        }
        Ok(())
    }
}

/// Decoder settings, fixed before the batch starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    /// Accept images whose encoded stream ends early
    pub tolerate_truncated: bool,

    /// Largest decoded image (width * height) accepted
    pub max_image_pixels: u64,

    /// Files at least this large are memory-mapped instead of read
    pub mmap_threshold: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            tolerate_truncated: true,
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
            mmap_threshold: 100 * 1024 * 1024, // 100MB
        }
    }
}

impl DecoderConfig {
    /// Same settings with truncation tolerance turned off
    pub fn strict(&self) -> Self {
        Self {
            tolerate_truncated: false,
            ..self.clone()
        }
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory holding the full-resolution images
    pub input_dir: Option<PathBuf>,

    /// Directory receiving the thumbnails
    pub output_dir: Option<PathBuf>,

    /// Number of worker threads (None = one per logical CPU)
    pub workers: Option<usize>,

    /// Descend into subdirectories of the input directory
    pub recursive: bool,
}

impl BatchConfig {
    /// Worker count with the CPU-count default applied
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ThumbError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(ThumbError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let content = match extension.to_lowercase().as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| ThumbError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| ThumbError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(ThumbError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| ThumbError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let thumbs = &self.thumbnails;

        if thumbs.ceiling_bytes == 0 {
            return Err(ThumbError::config("Ceiling must be greater than 0 bytes"));
        }

        thumbs.validate_precision()?;

        if thumbs.jpeg_quality == 0 || thumbs.jpeg_quality > 100 {
            return Err(ThumbError::config("JPEG quality must be between 1 and 100"));
        }

        thumbs.strategy.validate()?;

        if self.decoder.max_image_pixels == 0 {
            return Err(ThumbError::config("Pixel limit must be greater than 0"));
        }

        if let Some(workers) = self.batch.workers {
            if workers == 0 {
                return Err(ThumbError::config(
                    "Worker count must be greater than 0"
                ));
            }
        }

        Ok(())
    }
}
