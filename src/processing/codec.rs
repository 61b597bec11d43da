//! Color mode normalization and in-memory encoding

use std::io::Cursor;

use image::{ColorType, DynamicImage, ExtendedColorType};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ThumbError};
use crate::processing::formats::OutputFormat;

/// Channel layout of a decoded image, as the source stored it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    /// Single gray channel
    Luma,
    /// Gray plus alpha
    LumaAlpha,
    /// Plain three-channel color
    Rgb,
    /// Color plus alpha
    Rgba,
    /// Palette-indexed source (expanded to color samples by the decoder)
    Indexed,
}

impl ColorMode {
    /// Derive the mode from the file header and what the decoder reports
    ///
    /// Decoders expand palette samples before handing them out, so a palette
    /// source is recognised from its header (or an unknown original type).
    pub fn from_decoder(palette_header: bool, original: ExtendedColorType, decoded: ColorType) -> Self {
        if palette_header || matches!(original, ExtendedColorType::Unknown(_)) {
            return Self::Indexed;
        }
        Self::from_color_type(decoded)
    }

    pub fn from_color_type(color: ColorType) -> Self {
        match (color.has_color(), color.has_alpha()) {
            (false, false) => Self::Luma,
            (false, true) => Self::LumaAlpha,
            (true, false) => Self::Rgb,
            (true, true) => Self::Rgba,
        }
    }

    /// Modes the encoders cannot take as-is and get flattened to RGB
    pub fn needs_flattening(self) -> bool {
        matches!(self, Self::Indexed | Self::LumaAlpha | Self::Rgba)
    }
}

/// PNG signature followed by an IHDR chunk
const PNG_IHDR_PREFIX: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

/// IHDR color type of a palette-indexed PNG
const PNG_COLOR_INDEXED: u8 = 3;

/// Whether the leading bytes of a file describe a palette-indexed image.
///
/// PNG carries the color type at offset 25 of the IHDR chunk. GIF frames are
/// always palette-indexed.
pub fn is_palette_header(header: &[u8]) -> bool {
    if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        return true;
    }
    header.len() > 25 && header.starts_with(&PNG_IHDR_PREFIX) && header[25] == PNG_COLOR_INDEXED
}

/// Convert a raster into a mode every target encoder accepts.
///
/// Palette and alpha modes become 8-bit RGB. Other modes keep their channel
/// layout; wide samples are narrowed to 8 bits.
pub fn normalize(raster: DynamicImage, mode: ColorMode) -> (DynamicImage, ColorMode) {
    if mode.needs_flattening() {
        debug!("Flattening {:?} raster to RGB", mode);
        return (DynamicImage::ImageRgb8(raster.into_rgb8()), ColorMode::Rgb);
    }

    let raster = match raster {
        image @ (DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_)) => image,
        other if mode == ColorMode::Luma => DynamicImage::ImageLuma8(other.into_luma8()),
        other => DynamicImage::ImageRgb8(other.into_rgb8()),
    };

    (raster, mode)
}

/// Encode a raster into memory with the given encoder
pub fn encode(raster: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    match format {
        OutputFormat::Jpeg { quality } => {
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
            raster
                .write_with_encoder(encoder)
                .map_err(|e| ThumbError::encode(e.to_string(), None))?;
        }
        OutputFormat::Other(image_format) => {
            raster
                .write_to(&mut buffer, image_format)
                .map_err(|e| ThumbError::encode(e.to_string(), None))?;
        }
    }

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, LumaA, Rgb, Rgba};

    #[test]
    fn test_mode_from_decoder() {
        assert_eq!(
            ColorMode::from_decoder(false, ExtendedColorType::Unknown(8), ColorType::Rgb8),
            ColorMode::Indexed
        );
        assert_eq!(
            ColorMode::from_decoder(true, ExtendedColorType::Rgb8, ColorType::Rgb8),
            ColorMode::Indexed
        );
        assert_eq!(
            ColorMode::from_decoder(false, ExtendedColorType::Rgba8, ColorType::Rgba8),
            ColorMode::Rgba
        );
        assert_eq!(ColorMode::from_color_type(ColorType::L16), ColorMode::Luma);
        assert_eq!(ColorMode::from_color_type(ColorType::La8), ColorMode::LumaAlpha);
    }

    #[test]
    fn test_palette_header_detection() {
        let mut ihdr = PNG_IHDR_PREFIX.to_vec();
        ihdr.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 4, 8, PNG_COLOR_INDEXED, 0, 0, 0]);
        assert!(is_palette_header(&ihdr));

        ihdr[25] = 2;
        assert!(!is_palette_header(&ihdr));

        assert!(is_palette_header(b"GIF89a\x04\x00\x04\x00"));
        assert!(!is_palette_header(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!is_palette_header(&PNG_IHDR_PREFIX));
    }

    #[test]
    fn test_alpha_and_palette_modes_become_rgb() {
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(4, 3, Rgba([10, 20, 30, 128])));
        let (out, mode) = normalize(rgba, ColorMode::Rgba);
        assert_eq!(mode, ColorMode::Rgb);
        assert_eq!(out.color(), ColorType::Rgb8);
        assert_eq!((out.width(), out.height()), (4, 3));

        let gray_alpha = DynamicImage::ImageLumaA8(ImageBuffer::from_pixel(2, 2, LumaA([90, 10])));
        let (out, mode) = normalize(gray_alpha, ColorMode::LumaAlpha);
        assert_eq!(mode, ColorMode::Rgb);
        assert_eq!(out.color(), ColorType::Rgb8);

        let palette = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(2, 2, Rgb([1, 2, 3])));
        let (out, mode) = normalize(palette, ColorMode::Indexed);
        assert_eq!(mode, ColorMode::Rgb);
        assert_eq!(out.color(), ColorType::Rgb8);
    }

    #[test]
    fn test_plain_modes_pass_through() {
        let rgb = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(3, 3, Rgb([7, 8, 9])));
        let (out, mode) = normalize(rgb.clone(), ColorMode::Rgb);
        assert_eq!(mode, ColorMode::Rgb);
        assert_eq!(out, rgb);

        let gray16 = DynamicImage::ImageLuma16(ImageBuffer::from_pixel(3, 3, image::Luma([40_000u16])));
        let (out, mode) = normalize(gray16, ColorMode::Luma);
        assert_eq!(mode, ColorMode::Luma);
        assert_eq!(out.color(), ColorType::L8);
    }

    #[test]
    fn test_encode_jpeg_and_png() {
        let rgb = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(16, 16, Rgb([200, 100, 50])));

        let jpeg = encode(&rgb, OutputFormat::Jpeg { quality: 80 }).unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);

        let png = encode(&rgb, OutputFormat::Other(image::ImageFormat::Png)).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_jpeg_is_deterministic() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(32, 32, |x, y| {
            Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8])
        }));
        let a = encode(&img, OutputFormat::Jpeg { quality: 75 }).unwrap();
        let b = encode(&img, OutputFormat::Jpeg { quality: 75 }).unwrap();
        assert_eq!(a, b);
    }
}
