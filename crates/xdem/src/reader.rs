//! Parsing elevation files into [`Raster`]s.
//!
//! Two fixed layouts are read directly:
//! - `.hgt`: square big-endian i16 grid, size inferred from the file length,
//!   north row first, framing the unit tile
//! - `.raw`: square little-endian i16 grid stored south row first
//!
//! Everything else goes through a [`RasterDecoder`]; the default one reads
//! GeoTIFFs with the `tiff` crate.
//!
//! Reading never fails outright: a file that cannot be parsed yields an
//! all-nodata placeholder wrapped in [`Loaded::Degraded`].

use crate::coords::TileOrigin;
use crate::error::{Degradation, Loaded};
use crate::grid::Grid;
use crate::raster::{GeoFrame, Raster, RasterHeader, DEFAULT_NODATA, EPSG_NAD83, EPSG_WGS84};
use crate::repair::fill_nodata_nearest;
use crate::resample::{upsample_1201_to_3601, FULL_SIZE, LEGACY_SIZE};
use crate::{DemError, Result};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

/// GeographicTypeGeoKey.
const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
/// ProjectedCSTypeGeoKey.
const KEY_PROJECTED_CS_TYPE: u32 = 3072;

/// Raw output of a [`RasterDecoder`], before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRaster {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Absolute `(lon, lat)` of the north-west corner of the first pixel.
    pub tiepoint: (f64, f64),
    /// Degrees per pixel along `(lon, lat)`, both positive.
    pub pixel_scale: (f64, f64),
    /// Declared nodata value, if any.
    pub nodata: Option<f64>,
    /// Declared EPSG code, if any.
    pub epsg: Option<u32>,
    /// Samples, north row first; `None` when only the header was requested.
    pub cells: Option<Grid<f32>>,
}

/// Reads georeferenced rasters in formats other than hgt/raw.
pub trait RasterDecoder: Send + Sync {
    /// Decode `path`. With `header_only` the cells are not materialized.
    fn decode(&self, path: &Path, header_only: bool) -> Result<DecodedRaster>;
}

/// GeoTIFF decoder for single-band elevation files.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffDecoder;

impl GeoTiffDecoder {
    fn open(path: &Path) -> Result<Decoder<File>> {
        let file = File::open(path)?;
        // 1/3 arc-second tiles are 10812 x 10812 f32 samples (~466 MB)
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        Ok(Decoder::new(file)?.with_limits(limits))
    }

    fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<((f64, f64), (f64, f64))> {
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(|_| DemError::InvalidGeoTiff("missing ModelTiepoint tag".into()))?;
        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(|_| DemError::InvalidGeoTiff("missing ModelPixelScale tag".into()))?;
        if tiepoint.len() < 6 || scale.len() < 2 {
            return Err(DemError::InvalidGeoTiff("truncated geotransform tags".into()));
        }
        // Tiepoint is [i, j, k, x, y, z]; (i, j) is normally the top-left pixel.
        let tie_x = tiepoint[3] - tiepoint[0] * scale[0];
        let tie_y = tiepoint[4] + tiepoint[1] * scale[1];
        Ok(((tie_x, tie_y), (scale[0], scale[1])))
    }

    fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
        let text = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
        text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok()
    }

    fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
        let keys = decoder.get_tag_u32_vec(Tag::GeoKeyDirectoryTag).ok()?;
        // Header of four shorts, then (key id, tag location, count, value) entries.
        keys.get(4..)?
            .chunks_exact(4)
            .filter(|entry| entry[1] == 0)
            .find(|entry| entry[0] == KEY_PROJECTED_CS_TYPE || entry[0] == KEY_GEOGRAPHIC_TYPE)
            .map(|entry| entry[3])
            .filter(|&code| code != 0 && code != 32767)
    }

    fn decode_samples<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
        Ok(match decoder.read_image()? {
            DecodingResult::F32(data) => data,
            DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        })
    }
}

impl RasterDecoder for GeoTiffDecoder {
    fn decode(&self, path: &Path, header_only: bool) -> Result<DecodedRaster> {
        let mut decoder = Self::open(path)?;
        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);
        let (tiepoint, pixel_scale) = Self::read_geotransform(&mut decoder)?;
        let nodata = Self::read_nodata(&mut decoder);
        let epsg = Self::read_epsg(&mut decoder);

        let cells = if header_only {
            None
        } else {
            let samples = Self::decode_samples(&mut decoder)?;
            if samples.len() != width * height {
                return Err(DemError::UnsupportedDataType(format!(
                    "{} samples for a {}x{} image, only single band rasters are supported",
                    samples.len(),
                    width,
                    height
                )));
            }
            Some(Grid::from_vec(width, height, samples)?)
        };

        Ok(DecodedRaster {
            width,
            height,
            tiepoint,
            pixel_scale,
            nodata,
            epsg,
            cells,
        })
    }
}

/// Turns elevation files into normalized rasters.
pub struct RasterReader {
    decoder: Option<Box<dyn RasterDecoder>>,
}

impl std::fmt::Debug for RasterReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterReader")
            .field("has_decoder", &self.decoder.is_some())
            .finish()
    }
}

impl Default for RasterReader {
    fn default() -> Self {
        Self::new(Box::new(GeoTiffDecoder))
    }
}

impl RasterReader {
    /// Reader delegating non-hgt/raw formats to `decoder`.
    pub fn new(decoder: Box<dyn RasterDecoder>) -> Self {
        Self { decoder: Some(decoder) }
    }

    /// Reader for hgt/raw files only; other formats degrade.
    pub fn without_decoder() -> Self {
        Self { decoder: None }
    }

    /// Read `path` as the raster of `tile`.
    ///
    /// On failure the result is an all-nodata `fallback_size` square over the
    /// unit tile, marked as degraded.
    pub fn read(&self, path: &Path, tile: TileOrigin, fallback_size: usize) -> Loaded<Raster> {
        match self.load(path, tile) {
            Ok(raster) => Loaded::Ready(raster),
            Err(degradation) => {
                tracing::warn!("{}, replaced with nodata", degradation);
                Loaded::Degraded(Raster::placeholder(fallback_size), degradation)
            }
        }
    }

    /// Frame, size and nodata of `path` without decoding its cells.
    pub fn probe(&self, path: &Path, tile: TileOrigin, fallback_size: usize) -> Loaded<RasterHeader> {
        match self.load_header(path, tile) {
            Ok(header) => Loaded::Ready(header),
            Err(degradation) => {
                tracing::warn!("{}", degradation);
                Loaded::Degraded(RasterHeader::unit(fallback_size), degradation)
            }
        }
    }

    fn decoder(&self, path: &Path) -> std::result::Result<&dyn RasterDecoder, Degradation> {
        self.decoder.as_deref().ok_or_else(|| Degradation::Unsupported {
            path: path.to_path_buf(),
            reason: "no raster decoder available".into(),
        })
    }

    fn load(&self, path: &Path, tile: TileOrigin) -> std::result::Result<Raster, Degradation> {
        let as_corrupt = |e: DemError| corrupt(path, e);
        match extension(path).as_deref() {
            Some("hgt") => read_hgt(path).map_err(as_corrupt),
            Some("raw") => read_raw(path).map_err(as_corrupt),
            _ => {
                let decoded = self.decoder(path)?.decode(path, false).map_err(as_corrupt)?;
                normalize_decoded(decoded, tile, path).map_err(as_corrupt)
            }
        }
    }

    fn load_header(&self, path: &Path, tile: TileOrigin) -> std::result::Result<RasterHeader, Degradation> {
        let as_corrupt = |e: DemError| corrupt(path, e);
        match extension(path).as_deref() {
            Some("hgt") => {
                let size = square_size(path).map_err(as_corrupt)?;
                let size = if size == LEGACY_SIZE { FULL_SIZE } else { size };
                Ok(RasterHeader::unit(size))
            }
            Some("raw") => square_size(path).map(RasterHeader::unit).map_err(as_corrupt),
            _ => {
                let decoded = self.decoder(path)?.decode(path, true).map_err(as_corrupt)?;
                let frame = decoded_frame(&decoded, tile, path);
                Ok(RasterHeader {
                    frame,
                    width: decoded.width,
                    height: decoded.height,
                    nodata: DEFAULT_NODATA,
                })
            }
        }
    }
}

fn corrupt(path: &Path, e: DemError) -> Degradation {
    Degradation::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Edge length of a square 16-bit grid file.
fn square_size(path: &Path) -> Result<usize> {
    let bytes = std::fs::metadata(path)?.len();
    let size = ((bytes as f64) / 2.0).sqrt().round() as usize;
    if size == 0 || (size * size * 2) as u64 != bytes {
        return Err(DemError::Malformed {
            path: path.to_path_buf(),
            reason: format!("{} bytes is not a square 16-bit grid", bytes),
        });
    }
    Ok(size)
}

fn read_i16_grid(path: &Path, big_endian: bool) -> Result<Grid<f32>> {
    let size = square_size(path)?;
    let bytes = std::fs::read(path)?;
    let values = bytes
        .chunks_exact(2)
        .map(|b| {
            let v = if big_endian {
                i16::from_be_bytes([b[0], b[1]])
            } else {
                i16::from_le_bytes([b[0], b[1]])
            };
            v as f32
        })
        .collect();
    Grid::from_vec(size, size, values)
}

/// Read a degree-tile hgt file, bringing 3" grids up to 1".
fn read_hgt(path: &Path) -> Result<Raster> {
    let cells = read_i16_grid(path, true)?;
    let mut raster = Raster::new(GeoFrame::unit(), DEFAULT_NODATA, cells);
    if raster.width() == LEGACY_SIZE {
        if !fill_nodata_nearest(&mut raster) {
            raster.nodata_to_zero();
        }
        let upsampled = upsample_1201_to_3601(raster.cells())?;
        raster = Raster::new(GeoFrame::unit(), DEFAULT_NODATA, upsampled);
    }
    Ok(raster)
}

fn read_raw(path: &Path) -> Result<Raster> {
    let mut cells = read_i16_grid(path, false)?;
    cells.flip_rows();
    Ok(Raster::new(GeoFrame::unit(), DEFAULT_NODATA, cells))
}

/// How a declared EPSG code is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpsgCheck {
    /// No code declared; WGS 84 is assumed.
    Missing,
    /// WGS 84 or NAD 83.
    Supported(u32),
    /// Anything else; read as if it were WGS 84.
    Unsupported(u32),
}

impl EpsgCheck {
    fn of(epsg: Option<u32>) -> Self {
        match epsg {
            None => EpsgCheck::Missing,
            Some(code) if code == EPSG_WGS84 || code == EPSG_NAD83 => EpsgCheck::Supported(code),
            Some(code) => EpsgCheck::Unsupported(code),
        }
    }

    fn code(self) -> u32 {
        match self {
            EpsgCheck::Missing => EPSG_WGS84,
            EpsgCheck::Supported(code) | EpsgCheck::Unsupported(code) => code,
        }
    }
}

/// Frame of the pixel centers relative to the tile origin.
fn decoded_frame(decoded: &DecodedRaster, tile: TileOrigin, path: &Path) -> GeoFrame {
    let check = EpsgCheck::of(decoded.epsg);
    match check {
        EpsgCheck::Missing => tracing::warn!(
            "{} does not advertise its EPSG code, assuming {}",
            path.display(),
            EPSG_WGS84
        ),
        EpsgCheck::Unsupported(code) => tracing::error!(
            "Unsupported EPSG code {} in {}. Only EPSG:{} is supported, result is likely to be nonsense",
            code,
            path.display(),
            EPSG_WGS84
        ),
        EpsgCheck::Supported(_) => {}
    }
    let epsg = check.code();
    let (tie_x, tie_y) = decoded.tiepoint;
    let (sx, sy) = decoded.pixel_scale;
    let x0 = tie_x + 0.5 * sx - tile.lon as f64;
    let y1 = tie_y - 0.5 * sy - tile.lat as f64;
    GeoFrame {
        epsg,
        x0,
        y0: y1 - (decoded.height.saturating_sub(1)) as f64 * sy,
        x1: x0 + (decoded.width.saturating_sub(1)) as f64 * sx,
        y1,
    }
}

/// Convert decoder output to a raster with the default nodata sentinel.
fn normalize_decoded(decoded: DecodedRaster, tile: TileOrigin, path: &Path) -> Result<Raster> {
    let frame = decoded_frame(&decoded, tile, path);
    let mut cells = decoded
        .cells
        .ok_or_else(|| DemError::InvalidGeoTiff("decoder returned no samples".into()))?;
    match decoded.nodata {
        None => {
            tracing::warn!(
                "{} does not advertise its nodata value, assuming {}",
                path.display(),
                DEFAULT_NODATA
            );
        }
        Some(nodata) => {
            let nodata = nodata as f32;
            for v in cells.values_mut() {
                if *v == nodata || (nodata.is_nan() && v.is_nan()) {
                    *v = DEFAULT_NODATA;
                }
            }
        }
    }
    Ok(Raster::new(frame, DEFAULT_NODATA, cells))
}
