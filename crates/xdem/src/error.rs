//! Error types for the DEM crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when working with DEM data.
///
/// These are the conditions a caller has to act on. Recoverable problems
/// with a particular file or download are reported as a [`Degradation`]
/// alongside a usable placeholder raster instead.
#[derive(Debug, Error)]
pub enum DemError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// Image decoding or encoding error (coverage mask, normal map).
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Zip archive error.
    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// HTTP client construction or transport error.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Invalid GeoTIFF - missing required tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Unsupported data type in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// A logical source name that is not part of the known source table.
    #[error("unknown elevation source: {0:?}")]
    UnknownSource(String),

    /// A source spec string that cannot be interpreted.
    #[error("invalid source spec: {0:?}")]
    InvalidSpec(String),

    /// Grid dimensions do not match the operation.
    #[error("grid size mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    SizeMismatch {
        /// Expected width in pixels.
        expected_width: usize,
        /// Expected height in pixels.
        expected_height: usize,
        /// Actual width in pixels.
        width: usize,
        /// Actual height in pixels.
        height: usize,
    },

    /// A file does not contain what its name promises.
    #[error("malformed elevation file {path}: {reason}")]
    Malformed {
        /// File that failed to parse.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

/// Why a raster was replaced by a lower quality stand-in.
///
/// A degraded raster is still valid input for the rest of the pipeline
/// (usually an all-nodata or all-zero grid over the unit tile).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Degradation {
    /// The source has no data for this location.
    #[error("no elevation data available for {source_name} at ({lat}, {lon})")]
    Unavailable {
        /// Logical source name.
        source_name: String,
        /// Tile latitude.
        lat: i32,
        /// Tile longitude.
        lon: i32,
    },

    /// The file exists but could not be parsed.
    #[error("corrupt elevation file {path}: {reason}")]
    Corrupt {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// The file format needs a capability that is not available.
    #[error("unsupported elevation file {path}: {reason}")]
    Unsupported {
        /// File that could not be read.
        path: PathBuf,
        /// What is missing.
        reason: String,
    },
}

/// A value that was either produced as requested or replaced by a stand-in.
#[derive(Debug)]
pub enum Loaded<T> {
    /// Produced from real data.
    Ready(T),
    /// Produced as a placeholder; the reason says why.
    Degraded(T, Degradation),
}

impl<T> Loaded<T> {
    /// Unwrap the value regardless of quality.
    pub fn into_inner(self) -> T {
        match self {
            Loaded::Ready(value) | Loaded::Degraded(value, _) => value,
        }
    }

    /// Borrow the value regardless of quality.
    pub fn value(&self) -> &T {
        match self {
            Loaded::Ready(value) | Loaded::Degraded(value, _) => value,
        }
    }

    /// The degradation reason, if any.
    pub fn degradation(&self) -> Option<&Degradation> {
        match self {
            Loaded::Ready(_) => None,
            Loaded::Degraded(_, reason) => Some(reason),
        }
    }

    /// Whether the value is a placeholder.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Loaded::Degraded(..))
    }

    /// Map the value, keeping the quality marker.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Loaded<U> {
        match self {
            Loaded::Ready(value) => Loaded::Ready(f(value)),
            Loaded::Degraded(value, reason) => Loaded::Degraded(f(value), reason),
        }
    }
}
