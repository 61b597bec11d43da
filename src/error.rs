//! Error types and handling for Thumbsizer

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for Thumbsizer operations
pub type Result<T> = std::result::Result<T, ThumbError>;

/// Closed set of reasons a single thumbnail task can fail.
///
/// Every per-task failure maps onto exactly one kind, so callers can branch
/// on the kind instead of inspecting message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unreadable, corrupt, or oversized source image
    Decode,
    /// Target dimensions could not be formed
    Scale,
    /// The encoder rejected the raster
    Encode,
    /// Writing or measuring the output file failed
    Write,
    /// The fixed-step strategy ran out of room before meeting the ceiling
    CeilingUnreachable,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "DecodeError",
            Self::Scale => "ScaleError",
            Self::Encode => "EncodeError",
            Self::Write => "WriteError",
            Self::CeilingUnreachable => "CeilingUnreachable",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for Thumbsizer operations
#[derive(Debug, Error)]
pub enum ThumbError {
    /// Source image could not be read or decoded
    #[error("Decode error: {message} (file: {file:?})")]
    Decode {
        message: String,
        file: Option<PathBuf>,
    },

    /// Invalid target dimensions
    #[error("Scale error: {message} (file: {file:?})")]
    Scale {
        message: String,
        file: Option<PathBuf>,
    },

    /// Encoder rejected the raster or its color mode
    #[error("Encode error: {message} (file: {file:?})")]
    Encode {
        message: String,
        file: Option<PathBuf>,
    },

    /// Output file could not be written or measured
    #[error("Write error: {source} (file: {file:?})")]
    Write {
        #[source]
        source: std::io::Error,
        file: Option<PathBuf>,
    },

    /// Fixed-step search reached its bound while still over the ceiling
    #[error("Ceiling of {ceiling} bytes unreachable after {trials} trials, smallest output was {smallest} bytes (file: {file:?})")]
    CeilingUnreachable {
        ceiling: u64,
        trials: u32,
        smallest: u64,
        file: Option<PathBuf>,
    },

    /// Batch-level I/O errors (directory enumeration, output directory)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Directory walking errors
    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Record store errors
    #[error("Record store error: {0}")]
    RecordsError(#[from] csv::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Worker pool errors
    #[error("Worker pool error: {message}")]
    PoolError { message: String },
}

impl ThumbError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Decode {
            message: message.into(),
            file,
        }
    }

    /// Create a new scale error
    pub fn scale<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Scale {
            message: message.into(),
            file,
        }
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Encode {
            message: message.into(),
            file,
        }
    }

    /// Create a new write error
    pub fn write(source: std::io::Error, file: Option<PathBuf>) -> Self {
        Self::Write { source, file }
    }

    /// Create a new unreachable ceiling error
    pub fn ceiling_unreachable(ceiling: u64, trials: u32, smallest: u64, file: Option<PathBuf>) -> Self {
        Self::CeilingUnreachable {
            ceiling,
            trials,
            smallest,
            file,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new worker pool error
    pub fn pool<S: Into<String>>(message: S) -> Self {
        Self::PoolError {
            message: message.into(),
        }
    }

    /// The task failure kind, if this error is a per-task failure
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Decode { .. } => Some(FailureKind::Decode),
            Self::Scale { .. } => Some(FailureKind::Scale),
            Self::Encode { .. } => Some(FailureKind::Encode),
            Self::Write { .. } => Some(FailureKind::Write),
            Self::CeilingUnreachable { .. } => Some(FailureKind::CeilingUnreachable),
            _ => None,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Decode { file, .. }
            | Self::Scale { file, .. }
            | Self::Encode { file, .. }
            | Self::Write { file, .. }
            | Self::CeilingUnreachable { file, .. } => file.as_ref(),
            _ => None,
        }
    }

    /// Message without the kind prefix or file suffix, for per-task diagnostics
    pub fn detail(&self) -> String {
        match self {
            Self::Decode { message, .. }
            | Self::Scale { message, .. }
            | Self::Encode { message, .. } => message.clone(),
            Self::Write { source, .. } => source.to_string(),
            Self::CeilingUnreachable {
                ceiling,
                trials,
                smallest,
                ..
            } => format!(
                "still {} bytes after {} trials (ceiling {} bytes)",
                smallest, trials, ceiling
            ),
            other => other.to_string(),
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode { message, .. } => format!("Could not read image: {}", message),
            Self::Write { source, .. } => format!("Could not write thumbnail: {}", source),
            Self::CeilingUnreachable { ceiling, .. } => format!(
                "Thumbnail stays above {:.1} KiB even at its smallest size. Try the binary search strategy or a larger ceiling.",
                *ceiling as f64 / 1024.0
            ),
            other => other.to_string(),
        }
    }
}

impl From<toml::de::Error> for ThumbError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for ThumbError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Add file context to an error
    fn with_file_context(self, file: PathBuf) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ThumbError>,
{
    fn with_file_context(self, file: PathBuf) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();

            match &mut error {
                ThumbError::Decode { file: ref mut f, .. }
                | ThumbError::Scale { file: ref mut f, .. }
                | ThumbError::Encode { file: ref mut f, .. }
                | ThumbError::Write { file: ref mut f, .. }
                | ThumbError::CeilingUnreachable { file: ref mut f, .. } => {
                    if f.is_none() {
                        *f = Some(file);
                    }
                }
                _ => {}
            }

            error
        })
    }
}
