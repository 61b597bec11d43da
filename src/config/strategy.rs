//! Search strategies and resampling choices for thumbnail sizing

use serde::{Deserialize, Serialize};
use crate::error::{Result, ThumbError};

/// How the sizer looks for a scale ratio that fits under the ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Bisect the ratio interval [0, 1] until it is narrower than the precision
    #[default]
    BinarySearch,

    /// Shrink by a constant factor until the output fits, bounded by `max_iterations`
    FixedStep { factor: f64, max_iterations: u32 },
}

impl SearchStrategy {
    /// Fixed-step strategy with the customary 0.8 factor
    pub fn fixed_step() -> Self {
        Self::FixedStep {
            factor: 0.8,
            max_iterations: 64,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Self::FixedStep {
            factor,
            max_iterations,
        } = *self
        {
            if !(factor > 0.0 && factor < 1.0) {
                return Err(ThumbError::config(format!(
                    "Step factor must be between 0 and 1 (exclusive), got {}",
                    factor
                )));
            }
            if max_iterations == 0 {
                return Err(ThumbError::config("Step iteration bound must be greater than 0"));
            }
        }
        Ok(())
    }
}

/// Which encoding is left on disk once the binary search finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FinalArtifact {
    /// Leave whatever the last tested midpoint produced, even when it was over the ceiling
    #[default]
    LastTrial,

    /// Write back the largest-ratio trial that came in under the ceiling
    BestAccepted,
}

/// Available resize filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Nearest neighbor (fastest, lowest quality)
    Nearest,
    /// Triangle (linear interpolation)
    Triangle,
    /// Catmull-Rom cubic spline
    CatmullRom,
    /// Gaussian blur
    Gaussian,
    /// Lanczos with radius 3 (high quality, recommended)
    #[default]
    Lanczos3,
}

impl From<FilterType> for image::imageops::FilterType {
    fn from(filter: FilterType) -> Self {
        match filter {
            FilterType::Nearest => image::imageops::FilterType::Nearest,
            FilterType::Triangle => image::imageops::FilterType::Triangle,
            FilterType::CatmullRom => image::imageops::FilterType::CatmullRom,
            FilterType::Gaussian => image::imageops::FilterType::Gaussian,
            FilterType::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}
