//! # xdem
//!
//! Elevation raster acquisition and query engine.
//!
//! This crate turns heterogeneous Digital Elevation Model (DEM) sources into a
//! single height function over a one-degree tile, ready for mesh generation:
//! - Viewfinderpanoramas (J. de Ferranti) hgt archives, fetched on demand
//! - SRTMv3 and ALOS World 3D tiles placed in the cache manually
//! - USGS NED 1" and 1/3" GeoTIFFs, fetched on demand
//! - Any local hgt, raw or GeoTIFF file
//!
//! ## Overview
//!
//! ### Sources and the cache
//!
//! Every source tile has a deterministic place in the cache, e.g.
//! `Elevation_data/viewfinderpanoramas/+40+000/N45E007.hgt`. A tile already
//! present is recycled; otherwise it is downloaded with bounded exponential
//! backoff. Viewfinderpanoramas archives cover many tiles and are unpacked
//! completely.
//!
//! ### Global sources are stitched
//!
//! View, SRTM and ALOS ship one file per degree. The center tile is padded
//! with 36 pixels from each of its eight neighbors so that interpolation at
//! the tile edge has real context. Neighbors in open ocean are zero.
//!
//! ### Source specs and overrides
//!
//! A model is described by `<source>[;<override>;...]`. Overrides are local
//! files (or other sources) queried with strict nearest-cell lookups, last
//! listed first; where none has data the base raster is interpolated. The
//! `{latlon}` token is replaced by the tile name, e.g. `N45E007`.
//!
//! ## Example
//!
//! ```no_run
//! use xdem::{DemBuilder, DemConfig, TileOrigin};
//!
//! let config = DemConfig::from_yaml_str("cache_dir: ./Elevation_data")?;
//! let builder = DemBuilder::new(&config)?;
//!
//! let tile = TileOrigin::new(45, 7);
//! let model = builder.build("View;custom/{latlon}.tif", tile)?;
//!
//! // Offsets are relative to the south-west corner of the tile.
//! let (x, y) = tile.to_offset(7.25, 45.5);
//! println!("Elevation: {} meters", model.alt(x, y));
//! for degradation in model.degradations() {
//!     println!("degraded: {}", degradation);
//! }
//! # Ok::<(), xdem::DemError>(())
//! ```

mod acquire;
mod composite;
mod config;
mod coords;
mod coverage;
mod error;
mod fetch;
mod grid;
mod model;
mod raster;
mod reader;
mod repair;
mod resample;
mod sources;

pub use acquire::{DownloadStats, SourceAcquirer};
pub use composite::CompositeBuilder;
pub use config::{DemConfig, FillNodata, DEFAULT_MAX_ATTEMPTS, DEFAULT_NORMAL_MAP_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use coords::{hem_latlon, parse_hem_filename, round_latlon, wrap_lon, TileOrigin};
pub use coverage::CoverageMask;
pub use error::{DemError, Degradation, Loaded};
pub use fetch::{backoff_delay, FetchOutcome, Fetcher, HttpResponse, HttpTransport, ReqwestTransport, Sleeper, ThreadSleeper};
pub use grid::Grid;
pub use model::{DemBuilder, ElevationModel, ModelKind, NormalMap, SourceRef, SourceSpec, LATLON_PLACEHOLDER, OVERRIDE_SEPARATOR};
pub use raster::{GeoFrame, LevelSet, Raster, RasterHeader, DEFAULT_NODATA, EPSG_NAD83, EPSG_WGS84};
pub use reader::{DecodedRaster, GeoTiffDecoder, RasterDecoder, RasterReader};
pub use repair::{fill_nodata_nearest, MAX_PASSES, MAX_VOIDS};
pub use resample::{mask_weights, smoothen, upsample_1201_to_3601, FULL_SIZE, LEGACY_SIZE};
pub use sources::{generic_tif_path, ned_url, DemSource, GridLayout, ViewArchive, HGT_1_ARCSEC_BYTES, HGT_3_ARCSEC_BYTES};

/// Result type for DEM operations.
pub type Result<T> = std::result::Result<T, DemError>;
