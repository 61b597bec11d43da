//! Core image processing functionality

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::Config;
use crate::error::{ErrorContext, Result};

pub mod codec;
pub mod formats;
pub mod sizer;
pub mod source;

pub use codec::*;
pub use formats::*;
pub use sizer::*;
pub use source::*;

/// Decodes one source image and sizes its thumbnail
///
/// Holds no per-image state, so a single engine is shared by every worker.
#[derive(Debug, Clone)]
pub struct ThumbnailEngine {
    source: ImageSource,
    sizer: ThumbnailSizer,
}

impl ThumbnailEngine {
    pub fn new(source: ImageSource, sizer: ThumbnailSizer) -> Self {
        Self { source, sizer }
    }

    /// Build an engine from the decoder and thumbnail sections of a config
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ImageSource::new(config.decoder.clone()),
            ThumbnailSizer::new(config.thumbnails.clone())?,
        ))
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn sizer(&self) -> &ThumbnailSizer {
        &self.sizer
    }

    /// Decode `input`, normalize it, and size a thumbnail into `output`
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<ThumbnailResult> {
        let start_time = Instant::now();
        let input = input.as_ref();
        let output = output.as_ref();

        debug!("Processing file: {:?} -> {:?}", input, output);

        let task = self.source.decode(input)?.normalized();
        let outcome = self
            .sizer
            .run(&task.raster, output)
            .with_file_context(input.to_path_buf())?;

        let processing_time = start_time.elapsed();
        debug!(
            "Sized {:?}: {}x{} -> {}x{} ({} bytes, {} trials) in {:?}",
            input,
            task.width,
            task.height,
            outcome.on_disk.width,
            outcome.on_disk.height,
            outcome.on_disk.bytes,
            outcome.iterations(),
            processing_time
        );

        Ok(ThumbnailResult {
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            source_width: task.width,
            source_height: task.height,
            source_bytes: task.file_size,
            color_mode: task.color_mode,
            truncated: task.truncated,
            outcome,
            processing_time,
        })
    }
}

/// Result of thumbnailing one image
#[derive(Debug, Clone)]
pub struct ThumbnailResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub source_width: u32,
    pub source_height: u32,
    pub source_bytes: u64,
    pub color_mode: ColorMode,
    pub truncated: bool,
    pub outcome: SizingOutcome,
    pub processing_time: Duration,
}

impl ThumbnailResult {
    /// Whether the file on disk came in under `ceiling`
    pub fn under_ceiling(&self, ceiling: u64) -> bool {
        self.outcome.on_disk.bytes < ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    #[test]
    fn test_process_png_to_jpeg_thumbnail() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo.jpg");
        ImageBuffer::from_fn(120, 80, |x, y| Rgba([x as u8, y as u8, 90, 200]))
            .save(&input)
            .unwrap();

        let engine = ThumbnailEngine::from_config(&Config::default()).unwrap();
        let result = engine.process(&input, &output).unwrap();

        assert_eq!((result.source_width, result.source_height), (120, 80));
        assert_eq!(result.color_mode, ColorMode::Rgb);
        assert!(!result.truncated);
        assert!(result.under_ceiling(Config::default().thumbnails.ceiling_bytes));
        assert_eq!(
            std::fs::metadata(&output).unwrap().len(),
            result.outcome.on_disk.bytes
        );
    }

    #[test]
    fn test_process_failure_names_source() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.jpg");
        std::fs::write(&input, b"definitely not a jpeg").unwrap();

        let engine = ThumbnailEngine::from_config(&Config::default()).unwrap();
        let err = engine
            .process(&input, dir.path().join("out.jpg"))
            .unwrap_err();

        assert_eq!(err.kind(), Some(FailureKind::Decode));
        assert_eq!(err.file_path(), Some(&input));
    }
}
