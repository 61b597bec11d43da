//! Thumbsizer - Batch thumbnails under a byte-size ceiling
//!
//! Turns a directory of full-resolution images into thumbnails whose encoded
//! size stays below a fixed ceiling. The encoded size of an image cannot be
//! predicted from its dimensions, so each thumbnail is found by searching
//! over a scale ratio: scale, encode, write, measure, adjust.
//!
//! # Features
//!
//! - **Ceiling search**: binary search over the ratio, or a bounded
//!   fixed-step shrink
//! - **Parallel batches**: a fixed-size worker pool; one failing image never
//!   stops the batch
//! - **Tolerant decoding**: truncated sources decode with their missing rows
//!   left blank
//! - **Audits**: truncation scan and duplicate detection by average hash
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use thumbsizer::{Config, ThumbnailEngine};
//!
//! let engine = ThumbnailEngine::from_config(&Config::default())?;
//! let result = engine.process("fulls/harbor.jpg", "thumbs/harbor.jpg")?;
//!
//! println!(
//!     "{}x{} -> {} bytes after {} trials",
//!     result.outcome.on_disk.width,
//!     result.outcome.on_disk.height,
//!     result.outcome.on_disk.bytes,
//!     result.outcome.iterations()
//! );
//! # Ok::<(), thumbsizer::ThumbError>(())
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod audit;
pub mod config;
pub mod error;
pub mod parallel;
pub mod processing;

// Re-export commonly used types
pub use config::{Config, FinalArtifact, SearchStrategy, ThumbnailConfig};
pub use error::{FailureKind, Result, ThumbError};
pub use parallel::{BatchExecutor, BatchReport, ProgressTracker};
pub use processing::{ImageSource, ThumbnailEngine, ThumbnailSizer};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with default settings
///
/// Honors `RUST_LOG`, falling back to `info`. Safe to call more than once;
/// only the first call installs a subscriber.
pub fn init() -> Result<()> {
    init_with_config(&Config::default())
}

/// Initialize logging from the `[logging]` section of a configuration
///
/// `RUST_LOG` takes priority over the configured level when it is set.
pub fn init_with_config(config: &Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level).map_err(|e| {
            ThumbError::config(format!(
                "Invalid log level {:?}: {}",
                config.logging.level, e
            ))
        })?,
    };

    // Logs go to stderr so stdout stays clean for reports
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = if config.logging.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        info!("Thumbsizer v{} initialized", VERSION);
        log_capabilities();
    }

    Ok(())
}

fn log_capabilities() {
    debug!(
        "Detected {} logical CPUs ({} physical)",
        num_cpus::get(),
        num_cpus::get_physical()
    );
    debug!(
        "Input formats: {}",
        processing::supported_input_formats().join(", ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_twice() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "thumbsizer=shouting".to_string();
        // Only reported when RUST_LOG does not override it
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_with_config(&config).is_err());
        }
    }
}
