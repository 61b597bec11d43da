//! Image format detection and handling

use std::path::Path;
use crate::error::{Result, ThumbError};

/// Encoder selected for a thumbnail, derived from the output file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossy JPEG with an explicit quality (1-100)
    Jpeg { quality: u8 },
    /// Any other format the `image` crate can write, with its default settings
    Other(image::ImageFormat),
}

impl OutputFormat {
    /// Pick the encoder for an output path from its extension
    pub fn for_path<P: AsRef<Path>>(path: P, jpeg_quality: u8) -> Result<Self> {
        let path = path.as_ref();
        let format = image::ImageFormat::from_path(path).map_err(|e| {
            ThumbError::encode(
                format!("No encoder for output name: {}", e),
                Some(path.to_path_buf()),
            )
        })?;

        if !is_supported_output_format(format) {
            return Err(ThumbError::encode(
                format!("Output format {:?} is not supported", format),
                Some(path.to_path_buf()),
            ));
        }

        Ok(match format {
            image::ImageFormat::Jpeg => Self::Jpeg {
                quality: jpeg_quality.clamp(1, 100),
            },
            other => Self::Other(other),
        })
    }
}

/// Get supported input extensions
pub fn supported_input_formats() -> &'static [&'static str] {
    &["jpg", "jpeg", "png", "webp", "gif", "tiff", "tif", "bmp"]
}

/// Check if a file extension is supported for input
pub fn is_supported_input_format(extension: &str) -> bool {
    supported_input_formats()
        .iter()
        .any(|&fmt| fmt.eq_ignore_ascii_case(extension))
}

/// Check if a path carries a supported input extension
pub fn has_supported_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(is_supported_input_format)
}

/// Formats the pipeline writes thumbnails in
pub fn is_supported_output_format(format: image::ImageFormat) -> bool {
    matches!(
        format,
        image::ImageFormat::Jpeg
            | image::ImageFormat::Png
            | image::ImageFormat::WebP
            | image::ImageFormat::Gif
            | image::ImageFormat::Tiff
            | image::ImageFormat::Bmp
    )
}
