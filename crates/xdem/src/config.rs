//! Runtime configuration for elevation acquisition.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-request HTTP timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default number of HTTP attempts before a download is given up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default edge length of derived normal maps, in pixels.
pub const DEFAULT_NORMAL_MAP_SIZE: u32 = 4096;

/// What to do with nodata cells once a base raster is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillNodata {
    /// Nearest-neighbor repair; zero-fill if there are too many voids.
    #[default]
    Repair,
    /// Replace every void with zero altitude directly.
    ToZero,
    /// Leave voids in place (used for override sources).
    Keep,
}

/// Configuration for a [`DemBuilder`](crate::DemBuilder).
///
/// Every field has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemConfig {
    /// Root of the on-disk elevation cache.
    pub cache_dir: PathBuf,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Total HTTP attempts per download.
    pub max_attempts: u32,
    /// Nodata policy for base rasters.
    pub fill_nodata: FillNodata,
    /// 360x180 land/water PNG; tiles that are black in it are never fetched.
    pub coverage_mask: Option<PathBuf>,
    /// Edge length of derived normal maps.
    pub normal_map_size: u32,
}

impl Default for DemConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("Elevation_data"),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fill_nodata: FillNodata::default(),
            coverage_mask: None,
            normal_map_size: DEFAULT_NORMAL_MAP_SIZE,
        }
    }
}

impl DemConfig {
    /// Parse a configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = DemConfig::from_yaml_str("").unwrap();
        assert_eq!(config, DemConfig::default());
        assert_eq!(config.max_attempts, 6);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_yaml() {
        let config = DemConfig::from_yaml_str(
            "cache_dir: /tmp/dem\nfill_nodata: to_zero\ncoverage_mask: world_tiles.png\n",
        )
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/dem"));
        assert_eq!(config.fill_nodata, FillNodata::ToZero);
        assert_eq!(config.coverage_mask, Some(PathBuf::from("world_tiles.png")));
        assert_eq!(config.normal_map_size, DEFAULT_NORMAL_MAP_SIZE);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(DemConfig::from_yaml_str("fill_nodata: sometimes").is_err());
    }
}
