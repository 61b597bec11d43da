//! Truncation scan over an input set

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::parallel::{ProgressTracker, WorkerPool};
use crate::processing::ImageSource;

/// An input that would not decode without truncation tolerance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFinding {
    pub path: PathBuf,
    pub message: String,
}

/// Strictly decode every input and report the ones that fail.
///
/// `source` is switched to strict decoding whatever its own settings are, so
/// streams that end early show up here instead of being padded.
pub fn scan_truncated(
    source: &ImageSource,
    inputs: &[PathBuf],
    workers: usize,
    progress: &Arc<ProgressTracker>,
) -> Result<Vec<ScanFinding>> {
    let strict = Arc::new(ImageSource::new(source.config().strict()));
    let mut pool = WorkerPool::new(workers)?;

    for input in inputs.iter().cloned() {
        let strict = Arc::clone(&strict);
        let progress = Arc::clone(progress);
        pool.submit(move || {
            let file = progress.start_file();
            let result = strict.decode(&input).map(|_| ());
            file.finish(result.is_ok(), 0);
            result.err().map(|e| ScanFinding {
                path: input,
                message: e.detail(),
            })
        });
    }

    let mut findings = Vec::new();
    for (result, input) in pool.await_all().into_iter().zip(inputs) {
        match result {
            Ok(Some(finding)) => {
                warn!("Truncated image: {:?} ({})", finding.path, finding.message);
                findings.push(finding);
            }
            Ok(None) => {}
            Err(message) => findings.push(ScanFinding {
                path: input.clone(),
                message,
            }),
        }
    }

    info!("Scanned {} images, {} failed to decode", inputs.len(), findings.len());
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    #[test]
    fn test_scan_reports_truncated_files_only() {
        let dir = TempDir::new().unwrap();
        let whole = dir.path().join("whole.png");
        let cut = dir.path().join("cut.png");

        ImageBuffer::from_fn(64, 64, |x, y| Rgb([x as u8, y as u8, (x * y) as u8]))
            .save(&whole)
            .unwrap();
        let bytes = std::fs::read(&whole).unwrap();
        std::fs::write(&cut, &bytes[..bytes.len() / 2]).unwrap();

        // A JPEG cut short still decodes without complaint unless its end is checked
        let whole_jpeg = dir.path().join("whole.jpg");
        let cut_jpeg = dir.path().join("cut.jpg");
        ImageBuffer::from_fn(128, 128, |x, y| Rgb([(x * 7) as u8, (y * 13) as u8, (x ^ y) as u8]))
            .save(&whole_jpeg)
            .unwrap();
        let bytes = std::fs::read(&whole_jpeg).unwrap();
        std::fs::write(&cut_jpeg, &bytes[..bytes.len() / 2]).unwrap();

        // Tolerant settings are overridden by the scan
        let source = ImageSource::new(DecoderConfig::default());
        let inputs = source.enumerate(dir.path(), false).unwrap();
        let progress = Arc::new(ProgressTracker::hidden(inputs.len() as u64));

        let findings = scan_truncated(&source, &inputs, 2, &progress).unwrap();

        let mut flagged: Vec<_> = findings.iter().map(|f| f.path.clone()).collect();
        flagged.sort();
        assert_eq!(flagged, vec![cut_jpeg, cut]);
        assert_eq!(progress.state().failed_files, 2);
        assert_eq!(progress.state().completed_files, 2);
    }
}
