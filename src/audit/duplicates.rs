//! Duplicate detection by average hash

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::records::OwnerRecords;
use crate::error::Result;
use crate::parallel::{ProgressTracker, WorkerPool};
use crate::processing::ImageSource;

const HASH_SIDE: u32 = 8;

/// 64-bit average hash, one bit per cell of an 8x8 grayscale reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AverageHash(pub u64);

impl fmt::Display for AverageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hash an image: bits are set where a cell is brighter than the mean,
/// row-major with the first cell in the most significant bit.
pub fn average_hash(raster: &DynamicImage) -> AverageHash {
    let cells = raster
        .grayscale()
        .resize_exact(HASH_SIDE, HASH_SIDE, FilterType::Lanczos3)
        .into_luma8();

    let sum: u32 = cells.pixels().map(|p| u32::from(p.0[0])).sum();
    let mean = f64::from(sum) / f64::from(HASH_SIDE * HASH_SIDE);

    let bits = cells
        .pixels()
        .fold(0u64, |acc, p| (acc << 1) | u64::from(f64::from(p.0[0]) > mean));
    AverageHash(bits)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMember {
    pub path: PathBuf,
    pub owner: Option<String>,
}

/// Files sharing one hash
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub hash: AverageHash,
    pub members: Vec<DuplicateMember>,
}

/// Hash every input and return the groups with more than one member.
///
/// Inputs that fail to decode are logged and left out.
pub fn find_duplicates(
    source: &ImageSource,
    inputs: &[PathBuf],
    records: Option<&OwnerRecords>,
    workers: usize,
    progress: &Arc<ProgressTracker>,
) -> Result<Vec<DuplicateGroup>> {
    let source = Arc::new(source.clone());
    let mut pool = WorkerPool::new(workers)?;

    for input in inputs.iter().cloned() {
        let source = Arc::clone(&source);
        let progress = Arc::clone(progress);
        pool.submit(move || {
            let file = progress.start_file();
            let hash = source.decode(&input).map(|task| average_hash(&task.raster));
            file.finish(hash.is_ok(), 0);
            hash
        });
    }

    let mut by_hash: BTreeMap<AverageHash, Vec<PathBuf>> = BTreeMap::new();
    for (result, input) in pool.await_all().into_iter().zip(inputs) {
        match result {
            Ok(Ok(hash)) => by_hash.entry(hash).or_default().push(input.clone()),
            Ok(Err(e)) => warn!("Skipping {:?}: {}", input, e.detail()),
            Err(message) => warn!("Skipping {:?}: worker panicked: {}", input, message),
        }
    }

    let mut groups: Vec<DuplicateGroup> = by_hash
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(hash, paths)| DuplicateGroup {
            hash,
            members: paths
                .into_iter()
                .map(|path| {
                    let owner = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .and_then(|name| records.and_then(|r| r.owner(name)))
                        .map(str::to_string);
                    DuplicateMember { path, owner }
                })
                .collect(),
        })
        .collect();
    groups.sort_by(|a, b| a.members[0].path.cmp(&b.members[0].path));

    info!("Hashed {} images, {} duplicate groups", inputs.len(), groups.len());
    Ok(groups)
}
