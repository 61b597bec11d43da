//! Input enumeration and decoding

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage, ImageBuffer, ImageDecoder, ImageReader, Limits};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DecoderConfig;
use crate::error::{ErrorContext, Result, ThumbError};
use crate::processing::codec::{self, ColorMode};
use crate::processing::formats::has_supported_extension;

/// JPEG start-of-image and end-of-image markers
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// How far from the end of a JPEG stream the end-of-image marker may sit
const JPEG_TRAILER_WINDOW: u64 = 1024;

/// One decoded input, owned by the worker that processes it
#[derive(Debug, Clone)]
pub struct ImageTask {
    pub path: PathBuf,
    pub raster: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    /// Size of the source file on disk
    pub file_size: u64,
    /// The decoder hit the end of the stream early and the raster is partial
    pub truncated: bool,
}

impl ImageTask {
    /// Run the codec adapter over this task's raster
    pub fn normalized(self) -> Self {
        let (raster, color_mode) = codec::normalize(self.raster, self.color_mode);
        Self {
            raster,
            color_mode,
            ..self
        }
    }
}

/// Reads and decodes source images with a fixed set of decoder settings
#[derive(Debug, Clone)]
pub struct ImageSource {
    config: DecoderConfig,
}

impl ImageSource {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// List the supported image files of a directory, sorted by path
    pub fn enumerate<P: AsRef<Path>>(&self, dir: P, recursive: bool) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ThumbError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Input directory does not exist: {}", dir.display()),
            )));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
            let entry = entry?;
            if entry.file_type().is_file() && has_supported_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        debug!("Enumerated {} images in {:?}", files.len(), dir);
        Ok(files)
    }

    /// Decode one image into a task
    pub fn decode<P: AsRef<Path>>(&self, path: P) -> Result<ImageTask> {
        let path = path.as_ref();
        let file_size = std::fs::metadata(path)
            .map_err(|e| ThumbError::decode(format!("Cannot access file: {}", e), None))
            .with_file_context(path.to_path_buf())?
            .len();

        let (raster, color_mode, truncated) = if file_size >= self.config.mmap_threshold {
            self.decode_mmap(path)
        } else {
            self.decode_file(path)
        }
        .with_file_context(path.to_path_buf())?;

        if truncated {
            warn!("Image {:?} is truncated, missing rows left blank", path);
        }

        debug!(
            "Decoded {:?}: {}x{} {:?} ({:.2}MB)",
            path,
            raster.width(),
            raster.height(),
            color_mode,
            file_size as f64 / 1024.0 / 1024.0
        );

        Ok(ImageTask {
            path: path.to_path_buf(),
            width: raster.width(),
            height: raster.height(),
            raster,
            color_mode,
            file_size,
            truncated,
        })
    }

    fn decode_file(&self, path: &Path) -> Result<(DynamicImage, ColorMode, bool)> {
        let file = File::open(path)
            .map_err(|e| ThumbError::decode(format!("Cannot open file: {}", e), None))?;
        self.decode_reader(BufReader::new(file))
    }

    /// Decode a large file through a memory map
    fn decode_mmap(&self, path: &Path) -> Result<(DynamicImage, ColorMode, bool)> {
        use memmap2::MmapOptions;

        debug!("Using memory mapping for large file: {:?}", path);

        let file = File::open(path)
            .map_err(|e| ThumbError::decode(format!("Cannot open file: {}", e), None))?;

        // The map is read-only and dropped before this function returns
        let mmap = unsafe {
            MmapOptions::new()
                .map(&file)
                .map_err(|e| ThumbError::decode(format!("Cannot map file: {}", e), None))?
        };

        self.decode_reader(Cursor::new(&mmap[..]))
    }

    fn decode_reader<R: BufRead + Seek>(&self, mut inner: R) -> Result<(DynamicImage, ColorMode, bool)> {
        let header = inner
            .fill_buf()
            .map_err(|e| ThumbError::decode(format!("Cannot read header: {}", e), None))?;
        let palette = codec::is_palette_header(header);
        let missing_eoi = if header.starts_with(&JPEG_SOI) {
            !has_jpeg_trailer(&mut inner)
                .map_err(|e| ThumbError::decode(format!("Cannot read stream end: {}", e), None))?
        } else {
            false
        };

        let mut reader = ImageReader::new(inner)
            .with_guessed_format()
            .map_err(|e| ThumbError::decode(format!("Cannot read header: {}", e), None))?;
        reader.limits(Limits::no_limits());

        let decoder = reader
            .into_decoder()
            .map_err(|e| ThumbError::decode(e.to_string(), None))?;

        let (width, height) = decoder.dimensions();
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.config.max_image_pixels {
            return Err(ThumbError::decode(
                format!(
                    "Image too large: {}x{} pixels (limit: {} pixels)",
                    width, height, self.config.max_image_pixels
                ),
                None,
            ));
        }

        let color_mode =
            ColorMode::from_decoder(palette, decoder.original_color_type(), decoder.color_type());

        if !self.config.tolerate_truncated {
            if missing_eoi {
                return Err(ThumbError::decode(
                    "JPEG stream ends without an end-of-image marker",
                    None,
                ));
            }
            let raster = DynamicImage::from_decoder(decoder)
                .map_err(|e| ThumbError::decode(e.to_string(), None))?;
            return Ok((raster, color_mode, false));
        }

        let (raster, truncated) = decode_tolerant(decoder)?;
        Ok((raster, color_mode, truncated || missing_eoi))
    }
}

/// Look for the end-of-image marker near the end of a JPEG stream.
///
/// Entropy-coded data never contains `FF D9`, so a stream cut short has no
/// marker in its tail. Leaves the reader at the start of the stream.
fn has_jpeg_trailer<R: Read + Seek>(reader: &mut R) -> std::io::Result<bool> {
    let len = reader.seek(SeekFrom::End(0))?;
    let start = len.saturating_sub(JPEG_TRAILER_WINDOW);
    reader.seek(SeekFrom::Start(start))?;

    let mut tail = Vec::with_capacity((len - start) as usize);
    reader.read_to_end(&mut tail)?;
    reader.seek(SeekFrom::Start(0))?;

    Ok(tail.windows(2).any(|pair| pair == JPEG_EOI))
}

/// Decode into a zeroed buffer, keeping whatever arrived before the stream broke off.
///
/// The header has already parsed at this point, so an I/O or decoding error
/// inside the pixel data is treated as a truncated stream.
fn decode_tolerant<D: ImageDecoder>(decoder: D) -> Result<(DynamicImage, bool)> {
    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let total = usize::try_from(decoder.total_bytes())
        .map_err(|_| ThumbError::decode("Image does not fit in memory", None))?;

    let mut buf = vec![0u8; total];
    let truncated = match decoder.read_image(&mut buf) {
        Ok(()) => false,
        Err(image::ImageError::IoError(_) | image::ImageError::Decoding(_)) => true,
        Err(e) => return Err(ThumbError::decode(e.to_string(), None)),
    };

    let raster = raster_from_bytes(width, height, color, buf)
        .ok_or_else(|| ThumbError::decode(format!("Unsupported color type {:?}", color), None))?;
    Ok((raster, truncated))
}

/// Build a raster from decoder output bytes (native-endian samples)
fn raster_from_bytes(width: u32, height: u32, color: ColorType, buf: Vec<u8>) -> Option<DynamicImage> {
    fn wide(buf: &[u8]) -> Vec<u16> {
        buf.chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    fn float(buf: &[u8]) -> Vec<f32> {
        buf.chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    match color {
        ColorType::L8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
        ColorType::La8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8),
        ColorType::Rgb8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
        ColorType::Rgba8 => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8),
        ColorType::L16 => ImageBuffer::from_raw(width, height, wide(&buf)).map(DynamicImage::ImageLuma16),
        ColorType::La16 => ImageBuffer::from_raw(width, height, wide(&buf)).map(DynamicImage::ImageLumaA16),
        ColorType::Rgb16 => ImageBuffer::from_raw(width, height, wide(&buf)).map(DynamicImage::ImageRgb16),
        ColorType::Rgba16 => ImageBuffer::from_raw(width, height, wide(&buf)).map(DynamicImage::ImageRgba16),
        ColorType::Rgb32F => ImageBuffer::from_raw(width, height, float(&buf)).map(DynamicImage::ImageRgb32F),
        ColorType::Rgba32F => ImageBuffer::from_raw(width, height, float(&buf)).map(DynamicImage::ImageRgba32F),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 99]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_enumerate_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        write_png(&dir.path().join("b.png"), 4, 4);
        write_png(&dir.path().join("a.png"), 4, 4);
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_png(&dir.path().join("nested").join("c.png"), 4, 4);

        let source = ImageSource::new(DecoderConfig::default());
        let flat = source.enumerate(dir.path(), false).unwrap();
        let names: Vec<_> = flat.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(names, vec!["a.png", "b.png"]);

        let deep = source.enumerate(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_enumerate_missing_dir() {
        let source = ImageSource::new(DecoderConfig::default());
        assert!(source.enumerate("/definitely/not/here", false).is_err());
    }

    #[test]
    fn test_decode_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        write_png(&path, 20, 10);

        let task = ImageSource::new(DecoderConfig::default()).decode(&path).unwrap();
        assert_eq!((task.width, task.height), (20, 10));
        assert_eq!(task.color_mode, ColorMode::Rgb);
        assert!(!task.truncated);
        assert!(task.file_size > 0);
    }

    #[test]
    fn test_decode_alpha_reports_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sticker.png");
        ImageBuffer::from_pixel(5, 5, Rgba([1u8, 2, 3, 4])).save(&path).unwrap();

        let task = ImageSource::new(DecoderConfig::default()).decode(&path).unwrap();
        assert_eq!(task.color_mode, ColorMode::Rgba);
        let task = task.normalized();
        assert_eq!(task.color_mode, ColorMode::Rgb);
        assert_eq!(task.raster.color(), ColorType::Rgb8);
    }

    #[test]
    fn test_decode_garbage_fails_with_decode_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"this is not an image at all").unwrap();

        let err = ImageSource::new(DecoderConfig::default()).decode(&path).unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::FailureKind::Decode));
        assert_eq!(err.file_path(), Some(&path));
    }

    #[test]
    fn test_decode_missing_file() {
        let err = ImageSource::new(DecoderConfig::default())
            .decode("/no/such/image.png")
            .unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::FailureKind::Decode));
    }

    #[test]
    fn test_pixel_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 50, 50);

        let config = DecoderConfig {
            max_image_pixels: 100,
            ..Default::default()
        };
        let err = ImageSource::new(config).decode(&path).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_truncated_png_tolerance() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("full.png");
        let img = ImageBuffer::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 3) as u8]));
        img.save(&full).unwrap();

        let bytes = std::fs::read(&full).unwrap();
        let cut = dir.path().join("cut.png");
        std::fs::write(&cut, &bytes[..bytes.len() * 2 / 3]).unwrap();

        let strict = ImageSource::new(DecoderConfig::default().strict());
        assert!(strict.decode(&cut).is_err());

        let tolerant = ImageSource::new(DecoderConfig::default());
        let task = tolerant.decode(&cut).unwrap();
        assert!(task.truncated);
        assert_eq!((task.width, task.height), (64, 64));
    }

    #[test]
    fn test_decode_indexed_png_reports_palette() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("palette.png");

        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, 2, 2);
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_depth(png::BitDepth::Eight);
            encoder.set_palette(vec![255, 0, 0, 0, 0, 255]);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 1, 1, 0]).unwrap();
        }
        std::fs::write(&path, &bytes).unwrap();

        let task = ImageSource::new(DecoderConfig::default()).decode(&path).unwrap();
        assert_eq!(task.color_mode, ColorMode::Indexed);

        let task = task.normalized();
        assert_eq!(task.color_mode, ColorMode::Rgb);
        assert_eq!(task.raster.to_rgb8().get_pixel(1, 0), &Rgb([0, 0, 255]));
    }

    fn noise_jpeg(path: &Path, side: u32) {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let img = ImageBuffer::from_fn(side, side, |_, _| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let [r, g, b, ..] = state.to_le_bytes();
            Rgb([r, g, b])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_truncated_jpeg_tolerance() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("full.jpg");
        noise_jpeg(&full, 256);

        let bytes = std::fs::read(&full).unwrap();
        let cut = dir.path().join("cut.jpg");
        std::fs::write(&cut, &bytes[..bytes.len() / 2]).unwrap();

        let strict = ImageSource::new(DecoderConfig::default().strict());
        assert!(strict.decode(&full).is_ok());
        let err = strict.decode(&cut).unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::FailureKind::Decode));

        let tolerant = ImageSource::new(DecoderConfig::default());
        assert!(!tolerant.decode(&full).unwrap().truncated);
        let task = tolerant.decode(&cut).unwrap();
        assert!(task.truncated);
        assert_eq!((task.width, task.height), (256, 256));
    }

    #[test]
    fn test_jpeg_trailer_search() {
        let mut whole = Cursor::new(vec![0xFF, 0xD8, 0x12, 0x34, 0xFF, 0xD9, 0x00, 0x00]);
        assert!(has_jpeg_trailer(&mut whole).unwrap());
        assert_eq!(whole.position(), 0);

        let mut cut = Cursor::new(vec![0xFF, 0xD8, 0x12, 0x34, 0xFF, 0x00]);
        assert!(!has_jpeg_trailer(&mut cut).unwrap());
    }

    #[test]
    fn test_mmap_path_decodes_same_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        write_png(&path, 12, 8);

        let mapped = ImageSource::new(DecoderConfig {
            mmap_threshold: 0,
            ..Default::default()
        });
        let read = ImageSource::new(DecoderConfig::default());
        assert_eq!(mapped.decode(&path).unwrap().raster, read.decode(&path).unwrap().raster);
    }
}
